//! Reconciliation orchestrator.
//!
//! # Responsibilities
//! - Drive the host from the current state towards `ConnectorConfig`
//! - Gate every disruptive step on validation
//! - Decide between restarting now and deferring
//!
//! # Design Decisions
//! - One entry point for every trigger kind; state goes in and comes out
//! - Gating failures stop the run with a [`BlockReason`]; everything else is
//!   logged and the run carries on
//! - Any change to the storage options restarts or defers the iSCSI
//!   services; re-running with unchanged input rewrites nothing and defers
//!   nothing
//!
//! # Data Flow
//! ```text
//! ConfigChanged:
//!   container guard → validate → FC bus scan (once) → render policy,
//!   initiator, iscsid.conf, multipath drop-in → restart or defer iSCSI
//!   services → multipath -ll check → reload multipathd → Ready
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{validate, ConnectorConfig, StorageType};
use crate::host::fs::{ensure_dir, write_if_changed};
use crate::host::hba::ScanError;
use crate::host::iscsiadm::LoginOutcome;
use crate::host::{BoxedRunner, Host};
use crate::iscsi::initiator::{self, InitiatorError};
use crate::iscsi::{iscsid, ISCSI_SERVICES};
use crate::multipath::conf::{self, LunAlias, MultipathContext};
use crate::multipath::{parse as parse_topology, MultipathTopology};
use crate::observability::metrics;
use crate::reconcile::actions;
use crate::reconcile::state::{Phase, ReconciliationState, UnitStatus};
use crate::reconcile::trigger::{BlockReason, Delivery, Outcome, Trigger};
use crate::restart::{
    compose_status, policy, DeferredRestartLedger, LedgerError, PolicyRcdFile, RestartPolicy,
};

/// Packages the host needs regardless of transport.
pub const PACKAGES: [&str; 1] = ["multipath-tools"];

pub const MULTIPATHD: &str = "multipathd";

const DIR_MODE: u32 = 0o750;
const FILE_MODE: u32 = 0o600;

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: ReconciliationState,
    pub outcome: Outcome,
}

/// Applies configuration to the host.
#[derive(Clone)]
pub struct Orchestrator {
    host: Host,
    ledger: DeferredRestartLedger,
    policy: Arc<dyn RestartPolicy>,
}

impl Orchestrator {
    pub fn new(host: Host, ledger: DeferredRestartLedger, policy: Arc<dyn RestartPolicy>) -> Self {
        Self {
            host,
            ledger,
            policy,
        }
    }

    /// Wire the production collaborators for `config` around `runner`.
    pub fn from_config(config: &ConnectorConfig, runner: BoxedRunner) -> Result<Self, LedgerError> {
        let host = Host::new(runner, &config.paths);
        let ledger = DeferredRestartLedger::open(&config.paths.ledger_file(), config.application_name.clone())?;
        let policy = Arc::new(PolicyRcdFile::new(&config.paths.policy_dir, &config.application_name));
        Ok(Self::new(host, ledger, policy))
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn ledger(&self) -> &DeferredRestartLedger {
        &self.ledger
    }

    /// Handle one trigger against `config`, returning the next state.
    pub fn handle(
        &self,
        delivery: Delivery,
        config: &ConnectorConfig,
        mut state: ReconciliationState,
    ) -> Reconciled {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "reconcile",
            %run_id,
            trigger = %delivery.trigger,
            redelivered = delivery.redelivered
        );
        let _enter = span.enter();

        if let Err(e) = self.ledger.reload() {
            tracing::error!(error = %e, "Cannot reload deferred restarts");
        }

        let outcome = match delivery.trigger {
            Trigger::Install => self.install(config, &mut state),
            Trigger::ConfigChanged => self.config_changed(config, &mut state),
            Trigger::Start => self.start(delivery, config, &mut state),
            Trigger::UpdateStatus => {
                self.update_status(config, &mut state);
                Outcome::Completed
            }
        };

        if let Outcome::Blocked(reason) = &outcome {
            tracing::warn!(reason = %reason, "Reconciliation blocked");
            state.phase = Phase::Blocked;
            state.status = UnitStatus::Blocked(reason.to_string());
        }
        metrics::record_reconciliation(outcome.label());
        tracing::info!(outcome = outcome.label(), status = %state.status, "Reconciliation finished");

        Reconciled { state, outcome }
    }

    fn install(&self, config: &ConnectorConfig, state: &mut ReconciliationState) -> Outcome {
        state.status = UnitStatus::Maintenance("Installing software".to_string());
        let storage_type = match self.guard_and_validate(config, state) {
            Ok(t) => t,
            Err(reason) => return Outcome::Blocked(reason),
        };

        if let Err(e) = self.host.apt.ensure_installed(&PACKAGES) {
            tracing::error!(error = %e, packages = ?PACKAGES, "Package installation failed");
            return Outcome::Blocked(BlockReason::PackageInstall);
        }
        if storage_type == StorageType::Iscsi {
            for service in ISCSI_SERVICES {
                tracing::info!(service, "Enabling service");
                if let Err(e) = self.host.systemd.enable(service) {
                    tracing::error!(service, error = %e, "Failed to enable service");
                }
            }
        }

        tracing::info!("Install of software complete");
        state.installed = true;
        state.phase = if state.configured { Phase::Ready } else { Phase::Unconfigured };
        state.status = UnitStatus::Maintenance("Install complete".to_string());
        Outcome::Completed
    }

    fn config_changed(&self, config: &ConnectorConfig, state: &mut ReconciliationState) -> Outcome {
        match self.apply(config, state) {
            Ok(()) => Outcome::Completed,
            Err(reason) => Outcome::Blocked(reason),
        }
    }

    fn apply(&self, config: &ConnectorConfig, state: &mut ReconciliationState) -> Result<(), BlockReason> {
        state.status = UnitStatus::Maintenance("Validating configuration".to_string());
        let storage_type = self.guard_and_validate(config, state)?;

        if storage_type == StorageType::Fc && !state.fc_scan_ran_once {
            self.scan_fc_hosts()?;
            state.fc_scan_ran_once = true;
        }

        state.phase = Phase::Rendering;
        state.status = UnitStatus::Maintenance("Rendering configuration".to_string());
        self.create_directories(config, storage_type)?;

        if let Err(e) = policy::apply(self.policy.as_ref(), config.enable_auto_restarts) {
            tracing::error!(error = %e, "Failed to update the restart policy");
        }

        let fingerprint = match config.fingerprint() {
            Ok(digest) => Some(digest),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot fingerprint configuration");
                None
            }
        };
        if storage_type == StorageType::Iscsi {
            let files_changed = self.render_iscsi(config)?;
            let config_changed = fingerprint.is_none() || fingerprint != state.applied_config;
            if config_changed || files_changed || !state.started {
                self.restart_or_defer_iscsi(config, state);
            } else {
                tracing::debug!("iSCSI configuration unchanged, no restart needed");
            }
        }
        state.applied_config = fingerprint;

        self.render_multipath(config, storage_type)?;

        let topology = self.topology();
        if topology.is_malformed() {
            tracing::error!(errors = ?topology.errors, "Multipath configuration is probably malformed");
            return Err(BlockReason::MultipathConf(topology.errors));
        }
        metrics::record_path_counts(&topology.devices);

        actions::reload_multipathd(&self.host);

        tracing::info!("Setting started state");
        state.phase = Phase::Ready;
        state.configured = true;
        state.started = true;
        state.status = UnitStatus::Active(self.status_message(config));
        Ok(())
    }

    fn start(&self, delivery: Delivery, config: &ConnectorConfig, state: &mut ReconciliationState) -> Outcome {
        if !state.configured {
            if delivery.redelivered {
                tracing::info!("Start still precedes configuration, dropping it");
                return Outcome::Skipped;
            }
            tracing::warn!("Start called before configuration complete, deferring");
            return Outcome::Deferred;
        }
        state.started = true;
        if state.phase != Phase::Blocked {
            state.status = UnitStatus::Active(self.status_message(config));
        }
        tracing::info!("Started");
        Outcome::Completed
    }

    /// Forget restarts that happened behind our back and refresh the active message.
    pub fn update_status(&self, config: &ConnectorConfig, state: &mut ReconciliationState) {
        match self.ledger.check_restart_timestamps(&self.host.systemd) {
            Ok(cleared) if !cleared.is_empty() => {
                tracing::info!(?cleared, "Cleared deferred restarts of restarted services");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Cannot retrieve services' start time"),
        }
        if let UnitStatus::Active(_) = state.status {
            state.status = UnitStatus::Active(self.status_message(config));
        }
    }

    /// Restart each service, clearing the ledger for those that came back.
    ///
    /// Returns the services restarted successfully.
    pub fn restart_services(&self, services: &[&str]) -> Vec<String> {
        let mut restarted = Vec::new();
        for service in services {
            tracing::info!(service, "Restarting service");
            match self.host.systemd.restart(service) {
                Ok(()) => {
                    metrics::record_service_restart(service, true);
                    restarted.push(service.to_string());
                }
                Err(e) => {
                    metrics::record_service_restart(service, false);
                    tracing::error!(service, error = %e, "An error occurred while restarting service");
                }
            }
        }
        let done: Vec<&str> = restarted.iter().map(String::as_str).collect();
        if let Err(e) = self.ledger.clear(&done) {
            tracing::error!(error = %e, "Failed to clear deferred restarts");
        }
        restarted
    }

    pub fn status_message(&self, config: &ConnectorConfig) -> String {
        compose_status(&self.ledger, &config.application_name, config.enable_auto_restarts)
    }

    /// Parse a fresh `multipath -ll`. A failed run reads as empty output.
    pub fn topology(&self) -> MultipathTopology {
        match self.host.multipath.status() {
            Ok(text) => parse_topology(&text),
            Err(e) => {
                tracing::error!(error = %e, "Cannot run multipath");
                MultipathTopology::default()
            }
        }
    }

    fn guard_and_validate(
        &self,
        config: &ConnectorConfig,
        state: &mut ReconciliationState,
    ) -> Result<StorageType, BlockReason> {
        if self.host.virt.is_container() {
            tracing::error!("Storage connector is not supported on containers. Stopping execution.");
            return Err(BlockReason::Container);
        }

        state.phase = Phase::Validating;
        let storage_type = validate(config.storage_type.as_deref(), state.storage_type, config)
            .map_err(|e| BlockReason::Invalid(e.to_string()))?;
        if state.storage_type.is_none() {
            tracing::info!(storage_type = %storage_type, "Storage type adopted");
            state.storage_type = Some(storage_type);
        }
        Ok(storage_type)
    }

    fn scan_fc_hosts(&self) -> Result<(), BlockReason> {
        tracing::info!("Running scan of the host to discover LUN devices");
        match self.host.scanner.scan_all() {
            Ok(count) => {
                tracing::info!(adapters = count, "HBA scan complete");
                Ok(())
            }
            Err(ScanError::NoAdapters) => Err(BlockReason::NoScsiDevices),
            Err(e) => {
                tracing::error!(error = ?e, "An error occurred during the scan of the hosts");
                Err(BlockReason::ScanFailed)
            }
        }
    }

    fn create_directories(&self, config: &ConnectorConfig, storage_type: StorageType) -> Result<(), BlockReason> {
        let paths = &config.paths;
        let mut dirs = vec![paths.multipath_dir.clone(), paths.multipath_conf_dir()];
        if storage_type == StorageType::Iscsi {
            dirs.push(paths.iscsi_dir.clone());
        }
        for dir in dirs {
            ensure_dir(&dir, DIR_MODE).map_err(|e| {
                tracing::error!(path = %dir.display(), error = %e, "Cannot create directory");
                BlockReason::Render
            })?;
        }
        Ok(())
    }

    /// Render the initiator identity and `iscsid.conf`; true when either changed.
    fn render_iscsi(&self, config: &ConnectorConfig) -> Result<bool, BlockReason> {
        let hostname = self.host.fqdn().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cannot resolve the host FQDN");
            String::new()
        });
        let initiator_changed = initiator::ensure(
            &config.paths.initiator_name(),
            config.initiator_dictionary.as_deref(),
            &hostname,
            &self.host.iscsiadm,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "Cannot configure the initiator name");
            initiator_error_reason(&e)
        })?;

        tracing::info!("Rendering iscsid.conf");
        let conf_path = config.paths.iscsid_conf();
        let iscsid_changed = write_if_changed(&conf_path, &iscsid::render(config), FILE_MODE).map_err(|e| {
            tracing::error!(path = %conf_path.display(), error = %e, "Cannot write iscsid.conf");
            BlockReason::Render
        })?;

        Ok(initiator_changed || iscsid_changed)
    }

    fn restart_or_defer_iscsi(&self, config: &ConnectorConfig, state: &mut ReconciliationState) {
        if config.enable_auto_restarts || !state.started {
            state.phase = Phase::Restarting;
            self.restart_services(&ISCSI_SERVICES);
            if config.iscsi_discovery_and_login {
                match actions::iscsi_discovery_and_login(&self.host, config) {
                    Ok(LoginOutcome::AlreadyPresent) => {
                        tracing::info!("iSCSI session already present");
                    }
                    Ok(LoginOutcome::LoggedIn) => tracing::info!("iSCSI login complete"),
                    Err(e) => tracing::error!(error = %e, "Iscsi discovery and login failed"),
                }
            }
        } else if let Err(e) = self.ledger.defer(&ISCSI_SERVICES, "config changed") {
            tracing::error!(error = %e, "Failed to record deferred restarts");
        }
    }

    fn render_multipath(&self, config: &ConnectorConfig, storage_type: StorageType) -> Result<(), BlockReason> {
        let mut ctx = MultipathContext::from_config(config).map_err(|e| {
            tracing::error!(
                error = %e,
                "An exception has occurred. Please verify the format of the multipath config options"
            );
            BlockReason::MultipathSections
        })?;

        if storage_type == StorageType::Fc {
            tracing::info!("Retrieving device WWID via multipath -ll");
            let topology = self.topology();
            let wwid = topology.primary_wwid().ok_or(BlockReason::NoWwid)?;
            tracing::info!(wwid, "Found WWID");
            ctx.multipath = Some(LunAlias {
                wwid: wwid.to_string(),
                alias: config.fc_lun_alias.clone().unwrap_or_default(),
            });
        }

        let path = multipath_conf_path(config);
        write_if_changed(&path, &conf::render(&ctx), FILE_MODE).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Cannot write multipath configuration");
            BlockReason::Render
        })?;
        Ok(())
    }
}

fn initiator_error_reason(e: &InitiatorError) -> BlockReason {
    match e {
        InitiatorError::Dictionary(_) => BlockReason::InitiatorDictionary,
        InitiatorError::Generate(_) | InitiatorError::Io(_) => BlockReason::Render,
    }
}

/// `<multipath-dir>/conf.d/<application-name>-multipath.conf`
pub fn multipath_conf_path(config: &ConnectorConfig) -> PathBuf {
    config
        .paths
        .multipath_conf_dir()
        .join(format!("{}-multipath.conf", config.application_name))
}
