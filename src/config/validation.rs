//! Configuration validation.
//!
//! # Responsibilities
//! - Gate reconciliation on the storage type and its mandatory options
//! - Keep the storage type immutable once adopted
//! - Semantic checks on a freshly loaded file (serde handles syntax)
//!
//! # Design Decisions
//! - Both checks are pure: they classify, they never touch the host
//! - Load-time checks return all problems, not just the first
//! - Gate errors render as the exact status strings operators see

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{ConnectorConfig, StorageType};

/// Mandatory options per storage type, in reporting order.
pub const ISCSI_MANDATORY: &[&str] = &[
    "storage-type",
    "iscsi-target",
    "iscsi-port",
    "multipath-devices",
];

pub const FC_MANDATORY: &[&str] = &["storage-type", "fc-lun-alias", "multipath-devices"];

pub fn mandatory_options(storage_type: StorageType) -> &'static [&'static str] {
    match storage_type {
        StorageType::Iscsi => ISCSI_MANDATORY,
        StorageType::Fc => FC_MANDATORY,
    }
}

/// Why a configuration may not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing/Invalid storage type. Valid options are 'iscsi' or 'fc'.")]
    InvalidStorageType,

    #[error("Storage type cannot be changed after deployment.")]
    StorageTypeChanged {
        stored: StorageType,
        requested: StorageType,
    },

    #[error("Missing mandatory configuration option(s) {}", OptionList(.0))]
    MissingOptions(Vec<&'static str>),
}

/// Formats option names as `['a', 'b']`.
struct OptionList<'a>(&'a [&'static str]);

impl fmt::Display for OptionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}'", name)?;
        }
        write!(f, "]")
    }
}

/// Decide the effective storage type for `config`.
///
/// `selector` is the requested type as written by the operator, `stored` the
/// type adopted by an earlier successful validation. The stored type is
/// authoritative and never overwritten here.
pub fn validate(
    selector: Option<&str>,
    stored: Option<StorageType>,
    config: &ConnectorConfig,
) -> Result<StorageType, ValidationError> {
    let requested: StorageType = selector
        .and_then(|s| s.parse().ok())
        .ok_or(ValidationError::InvalidStorageType)?;

    let effective = match stored {
        None => {
            tracing::debug!(storage_type = %requested, "Adopting storage type");
            requested
        }
        Some(stored) if stored != requested => {
            return Err(ValidationError::StorageTypeChanged { stored, requested });
        }
        Some(stored) => stored,
    };

    let missing: Vec<&'static str> = mandatory_options(effective)
        .iter()
        .copied()
        .filter(|option| !config.is_set(option))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingOptions(missing));
    }

    Ok(effective)
}

/// A semantic problem in a loaded configuration file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("iscsi-port must be non-zero")]
    ZeroPort,

    #[error("invalid metrics-address {0:?}")]
    MetricsAddress(String),

    #[error("application-name must not be empty")]
    EmptyApplicationName,

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Semantic checks run by the loader. Storage-type rules are left to [`validate`].
pub fn validate_config(config: &ConnectorConfig) -> Result<(), Vec<ConfigIssue>> {
    let mut issues = Vec::new();

    if config.iscsi_port == Some(0) {
        issues.push(ConfigIssue::ZeroPort);
    }
    if config.application_name.trim().is_empty() {
        issues.push(ConfigIssue::EmptyApplicationName);
    }
    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        issues.push(ConfigIssue::MetricsAddress(obs.metrics_address.clone()));
    }
    if obs.update_status_interval_secs == 0 {
        issues.push(ConfigIssue::ZeroInterval("update-status-interval-secs"));
    }
    if obs.topology_interval_secs == 0 {
        issues.push(ConfigIssue::ZeroInterval("topology-interval-secs"));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
