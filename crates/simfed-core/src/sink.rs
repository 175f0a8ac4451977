//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Destinations for reflected attribute values."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::codec::ScalarValue;

/// Receives every successfully decoded reflected attribute value.
///
/// Called on the federation callback thread; implementations must not block.
pub trait ValueSink: Send + Sync {
    fn on_attribute_value(&self, name: &str, value: &ScalarValue);
}

impl<F> ValueSink for F
where
    F: Fn(&str, &ScalarValue) + Send + Sync,
{
    fn on_attribute_value(&self, name: &str, value: &ScalarValue) {
        self(name, value)
    }
}

/// Keeps the latest value per attribute name.
#[derive(Debug, Default)]
pub struct MemorySink {
    latest: RwLock<IndexMap<String, ScalarValue>>,
    deliveries: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ScalarValue> {
        self.latest.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> IndexMap<String, ScalarValue> {
        self.latest.read().clone()
    }

    /// Total values delivered, including overwrites.
    pub fn deliveries(&self) -> u64 {
        *self.deliveries.lock()
    }
}

impl ValueSink for MemorySink {
    fn on_attribute_value(&self, name: &str, value: &ScalarValue) {
        self.latest.write().insert(name.to_owned(), value.clone());
        *self.deliveries.lock() += 1;
    }
}

/// Appends `timestamp,attribute,value` rows to a CSV file.
pub struct CsvSink {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    /// Open `path` for appending, writing the header if the file is new.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        let path = path.as_ref().to_path_buf();
        let fresh = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        if fresh {
            writer.write_record(["timestamp", "attribute", "value"])?;
            writer.flush()?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ValueSink for CsvSink {
    fn on_attribute_value(&self, name: &str, value: &ScalarValue) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut writer = self.writer.lock();
        let written = writer
            .write_record([timestamp.as_str(), name, value.to_string().as_str()])
            .and_then(|_| writer.flush().map_err(csv::Error::from));
        if let Err(err) = written {
            warn!(path = %self.path.display(), attribute = name, error = %err, "failed to write sink row");
        }
    }
}
