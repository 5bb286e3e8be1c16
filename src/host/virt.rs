//! Virtualization detection.

use std::path::PathBuf;

use crate::host::exec::BoxedRunner;

/// Detects whether the host is a container.
#[derive(Clone)]
pub struct VirtDetector {
    runner: BoxedRunner,
    systemd_run_dir: PathBuf,
    container_marker: PathBuf,
}

impl VirtDetector {
    pub fn new(
        runner: BoxedRunner,
        systemd_run_dir: impl Into<PathBuf>,
        container_marker: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            systemd_run_dir: systemd_run_dir.into(),
            container_marker: container_marker.into(),
        }
    }

    /// On systemd hosts ask `systemd-detect-virt --container`, otherwise
    /// look for the upstart container marker file.
    pub fn is_container(&self) -> bool {
        if !self.systemd_run_dir.is_dir() {
            return self.container_marker.exists();
        }
        match self.runner.output("systemd-detect-virt", &["--container"]) {
            Ok(output) => output.is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot run systemd-detect-virt, assuming bare host");
                false
            }
        }
    }
}
