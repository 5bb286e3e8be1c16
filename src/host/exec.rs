//! Process execution.
//!
//! # Responsibilities
//! - Run external OS commands synchronously and capture their output
//! - Log every invocation with a per-runner sequence id
//! - Provide a scripted fake for tests
//!
//! # Design Decisions
//! - No timeouts: a hung command hangs the caller
//! - `output` never fails on a non-zero exit; `run` does

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent command.
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    /// A successful command printing `stdout`.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed command with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way a shell capture with `2>&1` reads.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Errors raised while running external commands.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to start execution of [{command}]: {err}")]
    ExecutionStart {
        command: String,
        #[source]
        err: std::io::Error,
    },

    #[error("Command [{command}] failed with status {status}: {}", .output.stderr.trim())]
    CommandFailure {
        command: String,
        status: String,
        output: CommandOutput,
    },
}

impl ExecutionError {
    /// Combined output of a command that ran and failed.
    pub fn failure_output(&self) -> Option<String> {
        match self {
            ExecutionError::CommandFailure { output, .. } => Some(output.combined()),
            ExecutionError::ExecutionStart { .. } => None,
        }
    }
}

/// Render a program and its arguments as a single line.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands on behalf of the host collaborators.
///
/// - In production this is a [`HostRunner`].
/// - Under test a [`FakeRunner`] scripts responses and records calls.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and return its output, whatever the exit status.
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecutionError>;

    /// Run a command and fail unless it exits successfully.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecutionError> {
        let output = self.output(program, args)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(ExecutionError::CommandFailure {
            command: command_line(program, args),
            status: output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            output,
        })
    }
}

/// Shared handle to a runner.
pub type BoxedRunner = Arc<dyn CommandRunner>;

/// Runs commands on the local host with `std::process`.
#[derive(Debug, Default)]
pub struct HostRunner {
    counter: AtomicU64,
}

impl HostRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> BoxedRunner {
        Arc::new(Self::new())
    }
}

impl CommandRunner for HostRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let line = command_line(program, args);
        tracing::info!(id, command = %line, "running command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| ExecutionError::ExecutionStart {
                command: line.clone(),
                err,
            })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        log_output(id, &output);
        Ok(output)
    }
}

fn log_output(id: u64, output: &CommandOutput) {
    tracing::info!(
        id,
        result = if output.is_success() { "OK" } else { "ERROR" },
        status = ?output.code,
        "finished running command"
    );
    if !output.stdout.is_empty() {
        tracing::debug!(id, stdout = %output.stdout, "command stdout");
    }
    if !output.stderr.is_empty() {
        tracing::debug!(id, stderr = %output.stderr, "command stderr");
    }
}

/// A command as seen by [`FakeRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The full command line, e.g. `systemctl restart iscsid`.
    pub fn line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Handler deciding what a fake command prints and returns.
pub type FakeHandler = Box<dyn FnMut(&Invocation) -> CommandOutput + Send>;

/// A runner which records every command and answers from a handler.
///
/// The default handler succeeds silently.
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    handler: Mutex<FakeHandler>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Mutex::new(Box::new(|_| CommandOutput::success())),
        })
    }

    /// Replace the response handler.
    pub fn set_handler(&self, handler: FakeHandler) {
        if let Ok(mut guard) = self.handler.lock() {
            *guard = handler;
        }
    }

    /// Every command line run so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(Invocation::line).collect())
            .unwrap_or_default()
    }

    /// Command lines starting with `prefix`.
    pub fn lines_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Coerce into the shared trait object.
    pub fn as_runner(self: &Arc<Self>) -> BoxedRunner {
        self.clone()
    }
}

impl CommandRunner for FakeRunner {
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecutionError> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let output = match self.handler.lock() {
            Ok(mut handler) => handler(&invocation),
            Err(_) => CommandOutput::success(),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_fails_on_nonzero_exit() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput::failure(3, "boom")));

        let err = runner.run("systemctl", &["reload", "multipathd"]).unwrap_err();
        assert!(err.to_string().contains("systemctl reload multipathd"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.failure_output().as_deref(), Some("boom"));
    }

    #[test]
    fn test_output_keeps_nonzero_exit() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput::failure(1, "warn")));

        let out = runner.output("multipath", &["-ll"]).unwrap();
        assert!(!out.is_success());
        assert_eq!(runner.lines(), vec!["multipath -ll".to_string()]);
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            code: Some(0),
            stdout: "a\n".into(),
            stderr: "b".into(),
        };
        assert_eq!(out.combined(), "a\nb");
        assert_eq!(CommandOutput::with_stdout("x").combined(), "x");
    }
}
