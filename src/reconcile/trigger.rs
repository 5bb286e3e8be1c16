//! Reconciliation inputs and outcomes.

use std::fmt;

/// What prompted a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Install,
    ConfigChanged,
    Start,
    UpdateStatus,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Install => "install",
            Trigger::ConfigChanged => "config-changed",
            Trigger::Start => "start",
            Trigger::UpdateStatus => "update-status",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger as handed to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub trigger: Trigger,
    /// Set when this trigger was deferred before and is being delivered again.
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            redelivered: false,
        }
    }

    pub fn redelivery(trigger: Trigger) -> Self {
        Self {
            trigger,
            redelivered: true,
        }
    }
}

/// Why reconciliation stopped short of `Ready`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockReason {
    #[error("Storage connector is not supported on containers.")]
    Container,

    /// A validation failure; the message is shown verbatim.
    #[error("{0}")]
    Invalid(String),

    #[error("No scsi devices were found. Scan aborted")]
    NoScsiDevices,

    #[error("Scan of the HBA adapters failed on the host.")]
    ScanFailed,

    #[error("Exception occurred during the multipath configuration. Please check logs.")]
    MultipathSections,

    #[error("No WWID was found. Please check multipath status and logs.")]
    NoWwid,

    #[error("Multipath conf error: {}", .0.join(", "))]
    MultipathConf(Vec<String>),

    #[error("Failed to install required packages. Please check logs.")]
    PackageInstall,

    #[error("Invalid initiator-dictionary option. Please check logs.")]
    InitiatorDictionary,

    #[error("Failed to write configuration files. Please check logs.")]
    Render,
}

/// How a delivery was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Blocked(BlockReason),
    /// Not handled yet; deliver again before the next trigger.
    Deferred,
    /// Nothing to do.
    Skipped,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Blocked(_) => "blocked",
            Outcome::Deferred => "deferred",
            Outcome::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipath_conf_message() {
        let reason = BlockReason::MultipathConf(vec![
            "invalid keyword: foo".into(),
            "invalid keyword: bar".into(),
        ]);
        assert_eq!(
            reason.to_string(),
            "Multipath conf error: invalid keyword: foo, invalid keyword: bar"
        );
    }

    #[test]
    fn test_invalid_is_verbatim() {
        let reason = BlockReason::Invalid("Storage type cannot be changed after deployment.".into());
        assert_eq!(reason.to_string(), "Storage type cannot be changed after deployment.");
    }
}
