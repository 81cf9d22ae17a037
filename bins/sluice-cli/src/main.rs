//! Command-line front end for the pipeline registry and the lifecycle
//! controller, modeled on the original Cobra command set (`add`, `list`,
//! `detail`, `start`, `stop`, `delete`) and on the teacher's
//! `bins/rde-cli/src/main.rs` bootstrap: `clap` derive args, a
//! `tracing_subscriber` registry init, `tokio::signal::ctrl_c()` wired to
//! a `CancellationToken` for graceful shutdown.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sluice_core::GlobalConfig;
use sluice_registry::{PipelineStatus, SqliteRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Declare, run, and inspect log-shipping pipelines")]
struct Args {
    /// TOML configuration file (DefaultChanBufferLen, LogLevel, PollPipelineChangesFreq, PythonPath).
    #[arg(long, default_value = "./sluice.toml")]
    config: PathBuf,

    /// Declared-state registry database file.
    #[arg(long, default_value = "./data/sluice.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a task-graph JSON file as a new, staged pipeline.
    Add { file: PathBuf },
    /// List every pipeline record.
    List,
    /// Show one pipeline record in full.
    Detail { id: i64 },
    /// Run the lifecycle controller until Ctrl-C, starting/stopping pipelines as declared.
    Start,
    /// Transition a running pipeline to stopping; the controller drains and stops it.
    Stop { id: i64 },
    /// Remove a pipeline record, stopping it first if it is running.
    Delete { id: i64 },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = %e, "sluice command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level().as_filter_str()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = Arc::new(SqliteRegistry::open(&args.db).context("opening registry database")?);

    match args.command {
        Command::Add { file } => add(&registry, &file).await,
        Command::List => list(&registry).await,
        Command::Detail { id } => detail(&registry, id).await,
        Command::Start => start(registry, Arc::new(config)).await,
        Command::Stop { id } => stop(&registry, id).await,
        Command::Delete { id } => delete(&registry, id).await,
    }
}

fn load_config(path: &PathBuf) -> Result<GlobalConfig> {
    match std::fs::read_to_string(path) {
        Ok(toml) => GlobalConfig::from_toml_str(&toml).context("parsing config file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GlobalConfig::default()),
        Err(e) => Err(e).context("reading config file"),
    }
}

async fn add(registry: &SqliteRegistry, file: &PathBuf) -> Result<()> {
    let task_graph = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let ops = sluice_core::graph::load(&task_graph).context("task graph is invalid")?;
    let interval = sluice_core::graph::interval_secs(&ops)?;
    let spec_name = file.file_name().and_then(|n| n.to_str()).unwrap_or("pipeline").to_string();

    let id = registry.add(&spec_name, &task_graph, interval as i64)?;
    println!("added pipeline {id} ({spec_name}, staged)");
    Ok(())
}

async fn list(registry: &SqliteRegistry) -> Result<()> {
    let records = registry.list()?;
    if records.is_empty() {
        println!("no pipelines registered");
        return Ok(());
    }
    println!("{:<6} {:<24} {:<10} {:<8} {:<8}", "id", "spec", "status", "alive", "interval");
    for record in records {
        println!(
            "{:<6} {:<24} {:<10} {:<8} {:<8}",
            record.id, record.spec, record.status, record.alive, record.interval
        );
    }
    Ok(())
}

async fn detail(registry: &SqliteRegistry, id: i64) -> Result<()> {
    let Some(record) = registry.detail(id)? else {
        bail!("no pipeline with id {id}");
    };
    println!("id:        {}", record.id);
    println!("spec:      {}", record.spec);
    println!("status:    {}", record.status);
    println!("alive:     {}", record.alive);
    println!("interval:  {}s", record.interval);
    println!("task graph:\n{}", record.task_graph);
    Ok(())
}

async fn start(registry: Arc<SqliteRegistry>, config: Arc<GlobalConfig>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let controller_shutdown = shutdown.clone();
    let controller = tokio::spawn(async move { sluice_runtime::run_controller(registry, config, controller_shutdown).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("received Ctrl-C, draining running pipelines...");
            shutdown.cancel();
        }
    }

    controller.await.context("lifecycle controller task panicked")?;
    Ok(())
}

async fn stop(registry: &SqliteRegistry, id: i64) -> Result<()> {
    let Some(record) = registry.detail(id)? else {
        bail!("no pipeline with id {id}");
    };
    if record.status != PipelineStatus::Running {
        bail!("pipeline {id} is not running (status: {})", record.status);
    }
    registry.set_status(id, PipelineStatus::Stopping)?;
    println!("pipeline {id} marked stopping, controller will drain it");
    Ok(())
}

/// Deletes a pipeline, honoring the registry's delete policy: a running
/// pipeline is first driven through stopping -> stopped (the controller
/// performs the actual drain on its next tick) before the record is
/// removed.
async fn delete(registry: &SqliteRegistry, id: i64) -> Result<()> {
    let Some(record) = registry.detail(id)? else {
        bail!("no pipeline with id {id}");
    };

    if record.status == PipelineStatus::Running {
        registry.set_status(id, PipelineStatus::Stopping)?;
        wait_for_stopped(registry, id).await?;
    }

    registry.delete(id)?;
    println!("deleted pipeline {id}");
    Ok(())
}

async fn wait_for_stopped(registry: &SqliteRegistry, id: i64) -> Result<()> {
    loop {
        let Some(record) = registry.detail(id)? else {
            return Ok(());
        };
        if record.status == PipelineStatus::Stopped {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
