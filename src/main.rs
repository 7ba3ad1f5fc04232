use std::sync::Arc;

use consul_params::metrics;
use consul_params::Error;
use consul_params::ParamSchema;
use consul_params::ParamValues;
use consul_params::Provider;
use consul_params::ProviderBuilder;
use consul_params::Result;
use consul_params::Settings;
use consul_params::Updater;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logs every table it receives
struct LoggingUpdater;

impl Updater for LoggingUpdater {
    fn update(
        &self,
        values: ParamValues,
    ) {
        match serde_json::to_string(&values) {
            Ok(json) => info!("Parameters changed: {}", json),
            Err(e) => error!("Failed to render parameters: {:?}", e),
        }
    }

    fn log(
        &self,
        level: Level,
        message: &str,
    ) {
        if level == Level::ERROR {
            error!("{}", message);
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;

    // Initializing Logs
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    if settings.store.address.is_empty() {
        return Err(Error::InvalidConfig("store.address must be set".into()));
    }

    let known = Arc::new(ParamSchema::from_paths(&settings.watch.parameters)?);
    let provider = ProviderBuilder::new(&settings.watch.prefix)
        .address(settings.store.address.clone())
        .store_config(settings.store.clone())
        .watch_config(settings.watch.clone())
        .build()?;

    let initial = provider.start(known, Arc::new(LoggingUpdater)).await?;
    println!("{}", serde_json::to_string_pretty(&initial)?);

    info!("Watching {}. Waiting for CTRL+C signal...", provider.prefix());
    let outcome = wait_for_shutdown().await;

    provider.stop().await;
    if graceful_tx.send(()).is_err() {
        info!("Metrics server was not running");
    }

    info!("Shutdown completed");
    outcome
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("Failed to install SIGINT handler: {e}")))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("Failed to install SIGTERM handler: {e}")))?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}
