use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tokio::time::{self, MissedTickBehavior};

use storage_connector::config::loader::load_config;
use storage_connector::config::watcher::ConfigWatcher;
use storage_connector::config::ConnectorConfig;
use storage_connector::host::HostRunner;
use storage_connector::lifecycle::{Dispatcher, SignalEvent, Signals};
use storage_connector::observability::{logging, metrics};
use storage_connector::reconcile::{Orchestrator, StateStore, Trigger};

const DEFAULT_CONFIG_PATH: &str = "/etc/storage-connector/config.toml";

#[derive(Parser)]
#[command(name = "storage-connector")]
#[command(about = "Host block-storage connector daemon", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Reconcile once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "storage-connector starting"
    );

    let metrics_enabled = config.observability.metrics_enabled;
    if metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let orchestrator = Orchestrator::from_config(&config, HostRunner::boxed())?;
    let mut dispatcher = Dispatcher::new(orchestrator, StateStore::new(config.paths.state_file()))?;

    let mut startup = Vec::new();
    if !dispatcher.state().installed {
        startup.push(Trigger::Install);
    }
    startup.extend([Trigger::ConfigChanged, Trigger::Start]);
    for trigger in startup {
        dispatch(&mut dispatcher, trigger, &config);
    }
    if args.once {
        tracing::info!(status = %dispatcher.state().status, "Single reconciliation complete");
        return Ok(());
    }

    let (watcher, mut config_rx) = ConfigWatcher::new(&args.config);
    let _watcher = watcher.run()?;
    let mut signals = Signals::register()?;

    let mut status_ticker = ticker(config.observability.update_status_interval_secs);
    let mut topology_ticker = ticker(config.observability.topology_interval_secs);
    // both tickers fire immediately; skip that, startup already reconciled
    status_ticker.tick().await;
    topology_ticker.tick().await;

    loop {
        tokio::select! {
            event = signals.recv() => match event {
                SignalEvent::Shutdown => break,
                SignalEvent::Reload => {
                    if let Some(new_config) = reload(&args.config) {
                        config = new_config;
                        dispatch(&mut dispatcher, Trigger::ConfigChanged, &config);
                    }
                }
            },
            Some(new_config) = config_rx.recv() => {
                config = new_config;
                dispatch(&mut dispatcher, Trigger::ConfigChanged, &config);
            }
            _ = status_ticker.tick() => {
                dispatch(&mut dispatcher, Trigger::UpdateStatus, &config);
            }
            _ = topology_ticker.tick(), if metrics_enabled => {
                let topology = tokio::task::block_in_place(|| dispatcher.orchestrator().topology());
                metrics::record_path_counts(&topology.devices);
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn dispatch(dispatcher: &mut Dispatcher, trigger: Trigger, config: &ConnectorConfig) {
    let outcome = tokio::task::block_in_place(|| dispatcher.dispatch(trigger, config));
    tracing::debug!(%trigger, outcome = outcome.label(), "Trigger handled");
}

fn reload(path: &Path) -> Option<ConnectorConfig> {
    match load_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
            None
        }
    }
}

fn ticker(secs: u64) -> time::Interval {
    let mut interval = time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
