//! llmd - LLM service lifecycle daemon
//!
//! Starts, stops and reports on the local model services over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use llmd::config::{Config, CONFIG_PATH};
use llmd::controller::LifecycleController;
use llmd::inspector::ProcInspector;
use llmd::prober::HttpProber;
use llmd::registry::ServiceRegistry;
use llmd::runner::{ScriptLauncher, ScriptRunner};
use llmd::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llmd")]
#[command(about = "LLM service lifecycle daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Listen address (overrides server.listen)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("[BOOT] llmd v{} starting...", env!("CARGO_PKG_VERSION"));
    if args.config.exists() {
        info!("[BOOT] Config loaded from {}", args.config.display());
    } else {
        info!("[BOOT] No config at {}, using defaults", args.config.display());
    }
    info!("[BOOT] Project dir: {}", config.project_dir.display());

    let specs = config.service_specs();
    for spec in &specs {
        info!(
            "[BOOT]   {} on port {} ({})",
            spec.name,
            spec.port,
            spec.name.description()
        );
    }

    let prober = HttpProber::new(config.lifecycle.health_timeout())
        .context("Failed to build health probe client")?;
    let runner = ScriptRunner::new(
        config.lifecycle.interpreter.clone(),
        config.lifecycle.script_timeout(),
    );
    let launcher = ScriptLauncher::new(runner, config.project_dir.clone());

    let controller = LifecycleController::new(
        ServiceRegistry::new(specs),
        Arc::new(ProcInspector::new()),
        Arc::new(prober),
        Arc::new(launcher),
        config.lifecycle.timings(),
    );
    let timings = controller.timings();
    info!(
        "[BOOT] Start polling: {} x {:?}, settle delay {:?}",
        timings.start_poll_attempts, timings.start_poll_interval, timings.settle_delay
    );

    controller.reconcile_all().await;
    info!("[READY] {} services registered", controller.registry().count());

    server::run(AppState::new(controller), &config.server.listen, shutdown_signal()).await?;

    info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
