//! Operator actions.
//!
//! Actions run on demand, outside the trigger sequence, against the same
//! host collaborators and ledger as the orchestrator.

use chrono::DateTime;

use crate::config::ConnectorConfig;
use crate::host::exec::ExecutionError;
use crate::host::iscsiadm::LoginOutcome;
use crate::host::Host;
use crate::reconcile::orchestrator::{Orchestrator, MULTIPATHD};
use crate::reconcile::state::{Phase, ReconciliationState};
use crate::restart::DeferredRestartLedger;

/// Services the restart action accepts by name.
pub const RESTARTABLE_SERVICES: [&str; 3] = ["iscsid", "open-iscsi", MULTIPATHD];

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("deferred-only and services are mutually exclusive")]
    MutuallyExclusive,

    #[error("Please specify either deferred-only or services")]
    NothingSpecified,

    #[error("No deferred services to restart")]
    NoDeferredServices,

    #[error("No valid services are specified.")]
    NoValidServices,

    #[error("Unit is not ready, current status: {0}")]
    NotReady(String),

    #[error("iscsi-target and iscsi-port must be set")]
    MissingTarget,

    #[error("Iscsi discovery failed against target")]
    Discovery(#[source] ExecutionError),

    #[error("Iscsi login failed against target")]
    Login(#[source] ExecutionError),

    #[error("cannot render deferred restarts: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// Parameters of the restart action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartRequest {
    pub deferred_only: bool,
    /// Whitespace separated service names.
    pub services: String,
}

/// Restart deferred or named services.
///
/// Returns the services restarted. The ledger is then reconciled against
/// service start times and the active status refreshed.
pub fn restart(
    orchestrator: &Orchestrator,
    config: &ConnectorConfig,
    state: &mut ReconciliationState,
    request: &RestartRequest,
) -> Result<Vec<String>, ActionError> {
    let requested: Vec<&str> = request.services.split_whitespace().collect();
    if request.deferred_only && !requested.is_empty() {
        return Err(ActionError::MutuallyExclusive);
    }
    if !request.deferred_only && requested.is_empty() {
        return Err(ActionError::NothingSpecified);
    }
    if state.phase != Phase::Ready {
        return Err(ActionError::NotReady(state.status.to_string()));
    }

    let ledger = orchestrator.ledger();
    if let Err(e) = ledger.reload() {
        tracing::error!(error = %e, "Cannot reload deferred restarts");
    }

    let targets: Vec<String> = if request.deferred_only {
        let deferred = ledger.services(None);
        if deferred.is_empty() {
            return Err(ActionError::NoDeferredServices);
        }
        tracing::info!(services = %deferred.join(", "), "Restarting the following deferred services");
        deferred
    } else {
        let mut valid: Vec<String> = requested
            .iter()
            .filter(|s| RESTARTABLE_SERVICES.contains(*s))
            .map(|s| s.to_string())
            .collect();
        valid.sort();
        valid.dedup();
        if valid.is_empty() {
            return Err(ActionError::NoValidServices);
        }
        tracing::info!(services = %valid.join(", "), "Restarting the following services");
        valid
    };

    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
    let restarted = orchestrator.restart_services(&targets);
    orchestrator.update_status(config, state);
    Ok(restarted)
}

/// One line per deferred restart, sorted, as a YAML list.
pub fn show_deferred_restarts(ledger: &DeferredRestartLedger) -> Result<String, ActionError> {
    if let Err(e) = ledger.reload() {
        tracing::error!(error = %e, "Cannot reload deferred restarts");
    }
    let mut lines: Vec<String> = ledger
        .list(None)
        .iter()
        .map(|event| {
            let when = DateTime::from_timestamp(event.timestamp, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| event.timestamp.to_string());
            format!("{} +0000 UTC {:<40} {}", when, event.service, event.reason)
        })
        .collect();
    lines.sort();
    Ok(serde_yaml::to_string(&lines)?)
}

/// Reload multipathd. Failures are logged only; returns whether it worked.
pub fn reload_multipathd(host: &Host) -> bool {
    tracing::info!("Reloading multipathd service");
    match host.systemd.reload(MULTIPATHD) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "An error occurred while reloading the multipathd service");
            false
        }
    }
}

/// Discover targets on the configured portal and log in to them.
pub fn iscsi_discovery_and_login(host: &Host, config: &ConnectorConfig) -> Result<LoginOutcome, ActionError> {
    let (Some(target), Some(port)) = (
        config.iscsi_target.as_deref().filter(|t| !t.trim().is_empty()),
        config.iscsi_port,
    ) else {
        return Err(ActionError::MissingTarget);
    };

    tracing::info!(iscsi_target = target, port, "Launching iscsiadm discovery and login against targets");
    host.iscsiadm.discover(target, port).map_err(ActionError::Discovery)?;
    let outcome = host.iscsiadm.login().map_err(|e| {
        tracing::error!(output = ?e.failure_output(), "Iscsi login failed");
        ActionError::Login(e)
    })?;
    Ok(outcome)
}
