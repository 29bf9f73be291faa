//! Orchestration engine server
//!
//! Boots the engine over an in-memory backend, spawns the table sweeps and
//! serves the REST ingress until interrupted.

use anyhow::Context;
use clap::Parser;
use mdm_engine::attachment::MemoryAttachmentStore;
use mdm_engine::bootstrap::seed_core_tables;
use mdm_engine::notify::RecordingNotifier;
use mdm_engine::scheduling::calendar::FixedHolidayCalendar;
use mdm_engine::workload::MemoryPropertyStore;
use mdm_engine::{AppConfig, MemoryBackend, RequestEngine, RestApi, Scheduler, SystemClock};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mdm-request-server", about = "MDM request orchestration engine")]
struct Args {
    /// Bind address for the REST ingress
    #[arg(long)]
    bind: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_from_env().context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.service.bind_addr = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let backend = Arc::new(MemoryBackend::new());
    seed_core_tables(&backend);

    let engine = RequestEngine::new(
        config.clone(),
        Arc::new(SystemClock),
        backend,
        Arc::new(MemoryAttachmentStore::new()),
        Arc::new(RecordingNotifier::new()),
        Arc::new(MemoryPropertyStore::new()),
        Arc::new(FixedHolidayCalendar::empty()),
    );

    let scheduler = Scheduler::new(engine.clone());
    let sweep_handles = scheduler.spawn();
    tracing::info!(
        tables = config.scheduler.master_tables.len(),
        "sweep loops started"
    );

    let router = RestApi::new(engine).router();
    let listener = tokio::net::TcpListener::bind(&config.service.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.service.bind_addr))?;
    tracing::info!(addr = %config.service.bind_addr, "serving REST ingress");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving")?;

    for handle in sweep_handles {
        handle.abort();
    }
    Ok(())
}
