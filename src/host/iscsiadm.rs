//! open-iscsi administration commands.

use crate::host::exec::{BoxedRunner, ExecutionError};

const ISCSIADM: &str = "iscsiadm";
const ISCSI_INAME: &str = "/sbin/iscsi-iname";

/// How a login request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    /// The node already had a session; iscsiadm reports this as a failure.
    AlreadyPresent,
}

/// Wraps `iscsiadm` and `iscsi-iname`.
#[derive(Clone)]
pub struct Iscsiadm {
    runner: BoxedRunner,
}

impl Iscsiadm {
    pub fn new(runner: BoxedRunner) -> Self {
        Self { runner }
    }

    /// `iscsiadm -m discovery -t sendtargets -p <target>:<port>`
    pub fn discover(&self, target: &str, port: u16) -> Result<(), ExecutionError> {
        let portal = format!("{}:{}", target, port);
        self.runner
            .run(
                ISCSIADM,
                &["-m", "discovery", "-t", "sendtargets", "-p", &portal],
            )
            .map(|_| ())
    }

    /// `iscsiadm -m node --login`
    pub fn login(&self) -> Result<LoginOutcome, ExecutionError> {
        match self.runner.run(ISCSIADM, &["-m", "node", "--login"]) {
            Ok(_) => Ok(LoginOutcome::LoggedIn),
            Err(err) => {
                let already = err
                    .failure_output()
                    .map(|out| out.contains("already present"))
                    .unwrap_or(false);
                if already {
                    Ok(LoginOutcome::AlreadyPresent)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Generate a random initiator IQN.
    pub fn generate_initiator_name(&self) -> Result<String, ExecutionError> {
        let output = self.runner.run(ISCSI_INAME, &[])?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::exec::{CommandOutput, FakeRunner};

    #[test]
    fn test_discovery_portal() {
        let runner = FakeRunner::new();
        Iscsiadm::new(runner.as_runner()).discover("10.0.0.5", 3260).unwrap();
        assert_eq!(
            runner.lines(),
            vec!["iscsiadm -m discovery -t sendtargets -p 10.0.0.5:3260"]
        );
    }

    #[test]
    fn test_login_already_present_is_success() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| {
            CommandOutput::failure(15, "iscsiadm: default: 1 session requested, but 1 already present.")
        }));
        let outcome = Iscsiadm::new(runner.as_runner()).login().unwrap();
        assert_eq!(outcome, LoginOutcome::AlreadyPresent);
    }

    #[test]
    fn test_login_other_failure() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput::failure(8, "connection timed out")));
        assert!(Iscsiadm::new(runner.as_runner()).login().is_err());
    }

    #[test]
    fn test_generate_initiator_name() {
        let runner = FakeRunner::new();
        runner.set_handler(Box::new(|_| CommandOutput::with_stdout("iqn.2004-10.com.ubuntu:01:abc\n")));
        let name = Iscsiadm::new(runner.as_runner()).generate_initiator_name().unwrap();
        assert_eq!(name, "iqn.2004-10.com.ubuntu:01:abc");
    }
}
