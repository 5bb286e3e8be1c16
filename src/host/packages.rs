//! Debian package installation.

use crate::host::exec::{BoxedRunner, ExecutionError};

/// Wraps `dpkg-query` and `apt-get`.
#[derive(Clone)]
pub struct Apt {
    runner: BoxedRunner,
}

impl Apt {
    pub fn new(runner: BoxedRunner) -> Self {
        Self { runner }
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.runner
            .output("dpkg-query", &["-W", "-f=${Status}", package])
            .map(|out| out.is_success() && out.stdout.contains("install ok installed"))
            .unwrap_or(false)
    }

    /// Install whichever of `packages` are missing.
    pub fn ensure_installed(&self, packages: &[&str]) -> Result<(), ExecutionError> {
        let missing: Vec<&str> = packages
            .iter()
            .copied()
            .filter(|p| !self.is_installed(p))
            .collect();
        if missing.is_empty() {
            tracing::debug!(?packages, "Packages already installed");
            return Ok(());
        }

        tracing::info!(packages = ?missing, "Installing packages");
        self.runner.run("apt-get", &["update"])?;
        let mut args = vec!["install", "-y", "--no-install-recommends"];
        args.extend(missing);
        self.runner.run("apt-get", &args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::exec::{CommandOutput, FakeRunner};

    #[test]
    fn test_skips_installed() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput::with_stdout("install ok installed")));
        Apt::new(runner.as_runner()).ensure_installed(&["multipath-tools"]).unwrap();
        assert!(runner.lines_starting_with("apt-get").is_empty());
    }

    #[test]
    fn test_installs_missing() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|inv| {
            if inv.program == "dpkg-query" {
                CommandOutput::failure(1, "no packages found")
            } else {
                CommandOutput::success()
            }
        }));
        Apt::new(runner.as_runner()).ensure_installed(&["multipath-tools"]).unwrap();
        assert_eq!(
            runner.lines_starting_with("apt-get"),
            vec![
                "apt-get update",
                "apt-get install -y --no-install-recommends multipath-tools",
            ]
        );
    }
}
