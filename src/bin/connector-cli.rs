use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use storage_connector::config::loader::load_config;
use storage_connector::config::ConnectorConfig;
use storage_connector::host::HostRunner;
use storage_connector::observability::check::{self, DEFAULT_URL};
use storage_connector::observability::logging;
use storage_connector::reconcile::actions::{self, RestartRequest};
use storage_connector::reconcile::{Orchestrator, StateStore};

#[derive(Parser)]
#[command(name = "connector-cli")]
#[command(about = "Operator actions for the storage connector", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "/etc/storage-connector/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Action(Action),

    /// Nagios check of paths per multipath volume
    CheckMultipath {
        /// Expected paths per volume; defaults to nagios-multipath-paths-per-volume
        #[arg(short = 'n', long)]
        expected_num: Option<u64>,

        /// Metrics endpoint to scrape
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

/// Actions run against the host, which need a loaded configuration.
#[derive(Subcommand)]
enum Action {
    /// Restart deferred or named services
    Restart {
        /// Restart every service with a deferred restart
        #[arg(long)]
        deferred_only: bool,

        /// Space separated list of services to restart
        #[arg(long, default_value = "")]
        services: String,
    },
    /// List deferred restarts
    ShowDeferredRestarts,
    /// Reload the multipathd service
    ReloadMultipathd,
    /// Run iSCSI discovery and login against the configured target
    IscsiDiscoveryAndLogin,
    /// Show the unit status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config);
    if let Ok(config) = &loaded {
        logging::init_logging(&config.observability.log_level);
    }

    let action = match cli.command {
        Commands::CheckMultipath { expected_num, url } => {
            let expected = expected_num.unwrap_or_else(|| {
                loaded
                    .as_ref()
                    .map(|c| u64::from(c.nagios_multipath_paths_per_volume))
                    .unwrap_or(0)
            });
            let result = check::check_multipath(&url, expected).await;
            println!("{}", result);
            return ExitCode::from(result.status.exit_code() as u8);
        }
        Commands::Action(action) => action,
    };

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(action, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(action: Action, config: &ConnectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::from_config(config, HostRunner::boxed())?;

    match action {
        Action::Restart {
            deferred_only,
            services,
        } => {
            let store = StateStore::new(config.paths.state_file());
            let mut state = store.load()?;
            let request = RestartRequest {
                deferred_only,
                services,
            };
            let restarted = actions::restart(&orchestrator, config, &mut state, &request)?;
            store.save(&state)?;
            println!("restarted: {}", restarted.join(", "));
            println!("success: True");
        }
        Action::ShowDeferredRestarts => {
            let listing = actions::show_deferred_restarts(orchestrator.ledger())?;
            println!("deferred-restarts:");
            print!("{}", listing);
        }
        Action::ReloadMultipathd => {
            let ok = actions::reload_multipathd(orchestrator.host());
            println!("success: {}", if ok { "True" } else { "False" });
        }
        Action::IscsiDiscoveryAndLogin => {
            let outcome = actions::iscsi_discovery_and_login(orchestrator.host(), config)?;
            println!("login: {:?}", outcome);
            println!("success: True");
        }
        Action::Status => {
            let state = StateStore::new(config.paths.state_file()).load()?;
            println!("{}", state.status);
            println!("phase: {:?}", state.phase);
            let pending = orchestrator.ledger().services(None);
            if !pending.is_empty() {
                println!("deferred: {}", pending.join(", "));
            }
        }
    }
    Ok(())
}
