//! multipath-tools commands.

use crate::host::exec::{BoxedRunner, ExecutionError};

/// Wraps the `multipath` status tool.
#[derive(Clone)]
pub struct MultipathTool {
    runner: BoxedRunner,
}

impl MultipathTool {
    pub fn new(runner: BoxedRunner) -> Self {
        Self { runner }
    }

    /// Raw `multipath -ll` output, stdout and stderr together.
    ///
    /// Configuration warnings such as `invalid keyword` go to stderr and may
    /// come with a non-zero exit, so the exit status is ignored.
    pub fn status(&self) -> Result<String, ExecutionError> {
        let output = self.runner.output("multipath", &["-ll"])?;
        Ok(output.combined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::exec::{CommandOutput, FakeRunner};

    #[test]
    fn test_status_includes_stderr() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "invalid keyword: user_friendly_name".into(),
        }));
        let text = MultipathTool::new(runner.as_runner()).status().unwrap();
        assert!(text.contains("invalid keyword: user_friendly_name"));
    }
}
