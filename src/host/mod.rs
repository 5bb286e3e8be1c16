//! Host collaborators.
//!
//! # Data Flow
//! ```text
//! orchestrator / actions
//!     → Host (one handle per collaborator)
//!     → exec.rs CommandRunner (HostRunner in production, FakeRunner in tests)
//!     → OS commands: systemctl, iscsiadm, apt-get, multipath, ...
//! ```
//!
//! # Design Decisions
//! - Every collaborator shares one runner, so a test observes every command
//!   in the order it ran
//! - Filesystem locations come from `PathsConfig`, never hard-coded

pub mod exec;
pub mod fs;
pub mod hba;
pub mod iscsiadm;
pub mod multipath;
pub mod packages;
pub mod systemd;
pub mod virt;

use crate::config::PathsConfig;

pub use exec::{BoxedRunner, CommandOutput, CommandRunner, ExecutionError, FakeRunner, HostRunner};

/// Bundle of the OS collaborators used by reconciliation and actions.
#[derive(Clone)]
pub struct Host {
    pub runner: BoxedRunner,
    pub systemd: systemd::Systemd,
    pub iscsiadm: iscsiadm::Iscsiadm,
    pub apt: packages::Apt,
    pub scanner: hba::ScsiHostScanner,
    pub virt: virt::VirtDetector,
    pub multipath: multipath::MultipathTool,
}

impl Host {
    pub fn new(runner: BoxedRunner, paths: &PathsConfig) -> Self {
        Self {
            systemd: systemd::Systemd::new(runner.clone()),
            iscsiadm: iscsiadm::Iscsiadm::new(runner.clone()),
            apt: packages::Apt::new(runner.clone()),
            scanner: hba::ScsiHostScanner::new(&paths.scsi_host_dir),
            virt: virt::VirtDetector::new(
                runner.clone(),
                &paths.systemd_run_dir,
                &paths.container_marker,
            ),
            multipath: multipath::MultipathTool::new(runner.clone()),
            runner,
        }
    }

    /// Fully qualified host name, from `hostname --fqdn`.
    pub fn fqdn(&self) -> Result<String, ExecutionError> {
        let output = self.runner.run("hostname", &["--fqdn"])?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn_trimmed() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|inv| match inv.program.as_str() {
            "hostname" => CommandOutput::with_stdout("testhost.testdomain\n"),
            _ => CommandOutput::success(),
        }));
        let host = Host::new(runner.as_runner(), &PathsConfig::default());
        assert_eq!(host.fqdn().unwrap(), "testhost.testdomain");
        assert_eq!(runner.lines(), vec!["hostname --fqdn"]);
    }
}
