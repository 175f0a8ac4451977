//! ---
//! fed_section: "01-core-functionality"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Shared primitives and utilities for the federate runtime."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_lookahead() -> f64 {
    1.0
}

fn default_unit_scale() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_enable_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_advance_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reservation_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_reservation_attempts() -> u32 {
    3
}

fn default_start_interaction() -> Option<String> {
    Some("Start".to_owned())
}

fn default_pause_interaction() -> Option<String> {
    Some("Pause".to_owned())
}

fn default_stop_interaction() -> Option<String> {
    Some("Stop".to_owned())
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for a federate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub federation: FederationConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    pub schema: SchemaConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SIMFED_CONFIG";

    /// Load configuration from disk, respecting the `SIMFED_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.federation.validate()?;
        self.time.validate()?;
        if self.reservation.max_attempts == 0 {
            return Err(anyhow!("reservation.max_attempts must be at least 1"));
        }
        self.schema.validate()?;
        self.control.validate(&self.schema)?;
        self.sink.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where and as whom this federate joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    pub federation_name: String,
    pub federate_name: String,
    #[serde(default = "default_host")]
    pub host: String,
    /// Reference to the federation object model handed to `join`.
    #[serde(default)]
    pub config_reference: Option<String>,
}

impl FederationConfig {
    fn validate(&self) -> Result<()> {
        if self.federation_name.trim().is_empty() {
            return Err(anyhow!("federation.federation_name must not be empty"));
        }
        if self.federate_name.trim().is_empty() {
            return Err(anyhow!("federation.federate_name must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("federation.host must not be empty"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Lookahead interval in federation logical-time units.
    #[serde(default = "default_lookahead")]
    pub lookahead: f64,
    /// Logical-time units per local simulation-time unit.
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    #[serde(default = "default_enable_timeout", rename = "enable_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub enable_timeout: Duration,
    #[serde(default = "default_advance_timeout", rename = "advance_timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub advance_timeout: Duration,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead(),
            unit_scale: default_unit_scale(),
            enable_timeout: default_enable_timeout(),
            advance_timeout: default_advance_timeout(),
        }
    }
}

impl TimeConfig {
    fn validate(&self) -> Result<()> {
        if !self.lookahead.is_finite() || self.lookahead < 0.0 {
            return Err(anyhow!(
                "time.lookahead must be a finite, non-negative interval (got {})",
                self.lookahead
            ));
        }
        if !self.unit_scale.is_finite() || self.unit_scale <= 0.0 {
            return Err(anyhow!(
                "time.unit_scale must be finite and positive (got {})",
                self.unit_scale
            ));
        }
        if self.advance_timeout.is_zero() || self.enable_timeout.is_zero() {
            return Err(anyhow!("time timeouts must be greater than zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    #[serde(default = "default_reservation_timeout", rename = "timeout_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    /// Number of names tried: the configured one plus decorated fallbacks.
    #[serde(default = "default_reservation_attempts")]
    pub max_attempts: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            timeout: default_reservation_timeout(),
            max_attempts: default_reservation_attempts(),
        }
    }
}

/// Wire type of an attribute or parameter as declared in the schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    #[serde(rename = "string", alias = "text")]
    Text,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Text => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative attribute/interaction schema shared with the federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub object_class: ObjectClassConfig,
    #[serde(default)]
    pub interactions: IndexMap<String, InteractionConfig>,
}

impl SchemaConfig {
    fn validate(&self) -> Result<()> {
        let class = &self.object_class;
        if class.name.trim().is_empty() {
            return Err(anyhow!("schema.object_class.name must not be empty"));
        }
        if class.instance_name.trim().is_empty() {
            return Err(anyhow!(
                "schema.object_class.instance_name must not be empty"
            ));
        }
        if class.attributes.is_empty() {
            return Err(anyhow!(
                "object class '{}' must declare at least one attribute",
                class.name
            ));
        }
        for (name, interaction) in &self.interactions {
            if !interaction.publish && !interaction.subscribe {
                return Err(anyhow!(
                    "interaction '{}' is neither published nor subscribed",
                    name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectClassConfig {
    pub name: String,
    pub instance_name: String,
    /// Subscribe to reflections of the same class from other federates.
    #[serde(default = "default_true")]
    pub subscribe: bool,
    pub attributes: IndexMap<String, ValueType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default)]
    pub parameters: IndexMap<String, ValueType>,
    #[serde(default = "default_true")]
    pub publish: bool,
    #[serde(default = "default_true")]
    pub subscribe: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            parameters: IndexMap::new(),
            publish: true,
            subscribe: true,
        }
    }
}

/// Interaction names translated into local-engine control calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_start_interaction")]
    pub start: Option<String>,
    #[serde(default = "default_pause_interaction")]
    pub pause: Option<String>,
    #[serde(default = "default_stop_interaction")]
    pub stop: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            start: default_start_interaction(),
            pause: default_pause_interaction(),
            stop: default_stop_interaction(),
        }
    }
}

impl ControlConfig {
    /// Iterate the configured control interaction names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.start, &self.pause, &self.stop]
            .into_iter()
            .filter_map(|name| name.as_deref())
    }

    fn validate(&self, schema: &SchemaConfig) -> Result<()> {
        for name in self.names() {
            match schema.interactions.get(name) {
                Some(interaction) if interaction.subscribe => {}
                Some(_) => {
                    return Err(anyhow!(
                        "control interaction '{}' must be subscribed",
                        name
                    ))
                }
                None => {
                    return Err(anyhow!(
                        "control interaction '{}' is not declared in schema.interactions",
                        name
                    ))
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Memory,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SinkConfig {
    fn validate(&self) -> Result<()> {
        if self.kind == SinkKind::Csv && self.path.is_none() {
            return Err(anyhow!("sink.path is required for csv sinks"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
