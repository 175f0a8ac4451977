//! ---
//! fed_section: "01-core-functionality"
//! fed_subsection: "binary"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Binary entrypoint for the SimFed federate daemon."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use simfed_common::config::LoadedAppConfig;
use simfed_common::{init_tracing, AppConfig, SinkKind, ValueType};
use simfed_core::{
    CsvSink, FederateMetrics, FederationService, InstanceHandle, LocalEngine, LogicalTime,
    MemorySink, ScalarValue, SimulationBridge, ValueSink,
};
use simfed_testharness::{FakeFederation, SteppingEngine};
use tokio::signal;
use tracing::{info, warn};

/// Instance the dry run uses to echo our own updates back as reflections.
const LOOPBACK_INSTANCE: InstanceHandle = InstanceHandle::new(u64::MAX);

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("SimFed ", env!("CARGO_PKG_VERSION")),
    about = "SimFed federate daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Validate the configuration and print the declared schema")]
    Check {
        #[arg(long, help = "Print the schema as JSON")]
        json: bool,
    },
    #[command(about = "Run the federate against an in-process federation")]
    DryRun {
        #[arg(long, default_value_t = 10, help = "Number of engine steps")]
        steps: u32,
        #[arg(long, default_value_t = 1.0, help = "Local simulation time per step")]
        step: f64,
        #[arg(long, value_name = "TIME", help = "Federation sends the stop interaction at this logical time")]
        stop_at: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
struct DryRunSummary {
    federation: String,
    federate: String,
    instance: String,
    steps_completed: u32,
    logical_time: f64,
    stop_requested: bool,
    updates_sent: u64,
    attributes_reflected: u64,
    attributes_skipped: u64,
    interactions_received: u64,
    interactions_dropped: u64,
    advances_granted: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/federate.toml"));
    candidates.push(PathBuf::from("configs/federate.example.toml"));

    let load_started = Instant::now();
    let LoadedAppConfig { config, source } = AppConfig::load_with_source(&candidates)?;
    init_tracing("simfedd", &config.logging)?;
    info!(
        config_path = %source.display(),
        load_ms = load_started.elapsed().as_millis() as u64,
        "configuration loaded"
    );

    match cli.command.unwrap_or(Commands::Check { json: false }) {
        Commands::Check { json } => render_schema(&config, json)?,
        Commands::DryRun {
            steps,
            step,
            stop_at,
        } => dry_run(config, steps, step, stop_at).await?,
    }

    Ok(())
}

fn render_schema(config: &AppConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.schema)?);
        return Ok(());
    }
    let class = &config.schema.object_class;
    println!(
        "Federation: {} as {} ({})",
        config.federation.federation_name, config.federation.federate_name, config.federation.host
    );
    println!(
        "Object class: {} (instance {}, subscribe {})",
        class.name, class.instance_name, class.subscribe
    );
    for (name, value_type) in &class.attributes {
        println!("  attribute {name:<24} {value_type}");
    }
    for (name, interaction) in &config.schema.interactions {
        println!(
            "Interaction: {name} (publish {}, subscribe {})",
            interaction.publish, interaction.subscribe
        );
        for (parameter, value_type) in &interaction.parameters {
            println!("  parameter {parameter:<24} {value_type}");
        }
    }
    let controls: Vec<&str> = config.control.names().collect();
    println!("Control interactions: {}", controls.join(", "));
    Ok(())
}

fn open_sink(config: &AppConfig) -> Result<Arc<dyn ValueSink>> {
    match (config.sink.kind, &config.sink.path) {
        (SinkKind::Csv, Some(path)) => {
            let sink = CsvSink::create(path)
                .with_context(|| format!("unable to open csv sink {}", path.display()))?;
            info!(path = %path.display(), "recording reflected values to csv");
            Ok(Arc::new(sink))
        }
        _ => Ok(Arc::new(MemorySink::new())),
    }
}

fn sample_value(value_type: ValueType, step: u32, local_time: f64) -> ScalarValue {
    match value_type {
        ValueType::Boolean => ScalarValue::Boolean(step % 2 == 0),
        ValueType::Int32 => ScalarValue::Int32(i32::try_from(step).unwrap_or(i32::MAX)),
        ValueType::Int64 => ScalarValue::Int64(i64::from(step)),
        ValueType::Float32 => ScalarValue::Float32(local_time as f32),
        ValueType::Float64 => ScalarValue::Float64(local_time),
        ValueType::Text => ScalarValue::Text(format!("step-{step}")),
    }
}

async fn dry_run(config: AppConfig, steps: u32, step: f64, stop_at: Option<f64>) -> Result<()> {
    let registry = config.metrics.enabled.then(Registry::new);
    let metrics = match &registry {
        Some(registry) => Arc::new(FederateMetrics::with_registry(registry)?),
        None => Arc::new(FederateMetrics::new()),
    };
    let cancel = Arc::new(AtomicBool::new(false));

    let worker = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || run_federate(config, metrics, cancel, steps, step, stop_at))
    };
    tokio::pin!(worker);

    let summary = tokio::select! {
        joined = &mut worker => joined.context("dry run task panicked")??,
        _ = signal::ctrl_c() => {
            info!("ctrl-c received; finishing current step and shutting down");
            cancel.store(true, Ordering::SeqCst);
            worker.await.context("dry run task panicked")??
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(registry) = registry {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        println!("{}", String::from_utf8_lossy(&buffer));
    }
    Ok(())
}

fn run_federate(
    config: AppConfig,
    metrics: Arc<FederateMetrics>,
    cancel: Arc<AtomicBool>,
    steps: u32,
    step: f64,
    stop_at: Option<f64>,
) -> Result<DryRunSummary> {
    let fake = FakeFederation::shared();
    let engine = Arc::new(SteppingEngine::new(step));
    let service: Arc<dyn FederationService> = fake.clone();
    let local: Arc<dyn LocalEngine> = engine.clone();
    let bridge = SimulationBridge::start_with_metrics(
        &config,
        service,
        local,
        open_sink(&config)?,
        metrics,
    )
    .context("federate start-up failed")?;

    if let (Some(at), Some(stop)) = (stop_at, config.control.stop.as_deref()) {
        fake.schedule_interaction(LogicalTime::new(at), stop, std::iter::empty())
            .with_context(|| format!("unable to schedule '{stop}' interaction"))?;
    }

    let attributes: Vec<(String, ValueType)> = config
        .schema
        .object_class
        .attributes
        .iter()
        .map(|(name, value_type)| (name.clone(), *value_type))
        .collect();

    let mut completed = 0;
    while completed < steps && !cancel.load(Ordering::SeqCst) && !bridge.stop_requested() {
        let Some(local_time) = engine.step() else {
            warn!("engine paused or stopped by the federation; ending dry run");
            break;
        };
        completed += 1;
        let values = attributes
            .iter()
            .map(|(name, value_type)| (name.as_str(), sample_value(*value_type, completed, local_time)));
        bridge.publish(values)?;
        if let Some((_, update)) = fake.updates().pop() {
            fake.inject_reflection(LOOPBACK_INSTANCE, update);
        }
        let granted = bridge.on_time_boundary()?;
        info!(step = completed, local_time, %granted, "step complete");
    }

    let snapshot = bridge.metrics().snapshot();
    let summary = DryRunSummary {
        federation: bridge.session().federation_name().to_owned(),
        federate: bridge.session().federate_name().to_owned(),
        instance: bridge.instance_name().to_owned(),
        steps_completed: completed,
        logical_time: bridge.logical_time().value(),
        stop_requested: bridge.stop_requested(),
        updates_sent: snapshot.updates_sent,
        attributes_reflected: snapshot.attributes_reflected,
        attributes_skipped: snapshot.attributes_skipped,
        interactions_received: snapshot.interactions_received,
        interactions_dropped: snapshot.interactions_dropped,
        advances_granted: snapshot.advances_granted,
    };
    bridge.shutdown()?;
    Ok(summary)
}
