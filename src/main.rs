use clap::Parser;
use dnskeyage::config::{Cli, RunConfig};
use dnskeyage::error::ConfigError;
use dnskeyage::monitor::Monitor;
use dnskeyage::resolver::KeyResolver;
use dnskeyage::store::{HistoryStore, InfluxClient, OfflineStore};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "dnskeyage=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_store(config: &RunConfig) -> Result<Arc<dyn HistoryStore>, ConfigError> {
    match &config.store {
        Some(settings) => {
            let client =
                InfluxClient::new(settings).map_err(|e| ConfigError::Client(e.to_string()))?;
            Ok(Arc::new(client))
        }
        None => {
            info!("No store configured, history is empty for this dry run");
            Ok(Arc::new(OfflineStore))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = RunConfig::load(&cli);
    init_logging(cli.verbose || loaded.as_ref().is_ok_and(|c| c.verbose));

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    if config.dry_run {
        info!("Dry run, nothing will be written to the store");
    }

    let store = match build_store(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let monitor = Monitor::new(
        KeyResolver::new(config.resolvers.clone()),
        store,
        config.dry_run,
    )
    .with_concurrency(config.concurrency);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let summary = monitor.run(&config.zones, shutdown_rx).await;

    for report in &summary.zones {
        info!("{}: {:?}", report.zone, report.outcome);
    }
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        warn!(
            "{} of {} zones failed, {} cancelled",
            summary.failed(),
            summary.zones.len(),
            summary.cancelled()
        );
        ExitCode::FAILURE
    }
}
