//! Restart-block policy.
//!
//! While automatic restarts are disabled, package maintainer scripts must not
//! bounce the storage services either. The block list is published as a
//! policy file that `policy-rc.d` consults before running an init action.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::restart::ledger::REQUESTOR_TYPE;

/// Init actions blocked while auto-restarts are off.
pub const BLOCKED_ACTIONS: [&str; 3] = ["stop", "restart", "try-restart"];

/// Services covered by the policy.
pub const MANAGED_SERVICES: [&str; 3] = ["iscsid", "open-iscsi", "multipathd"];

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("policy file {path} is malformed: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Capability to stop the OS from restarting services behind our back.
pub trait RestartPolicy: Send + Sync {
    /// Block `actions` for `service`, replacing any previous block.
    fn block(&self, service: &str, actions: &[&str]) -> Result<(), PolicyError>;

    /// Remove every block for `service`.
    fn unblock(&self, service: &str) -> Result<(), PolicyError>;
}

/// Block or unblock every managed service according to the auto-restart option.
pub fn apply(policy: &dyn RestartPolicy, auto_restarts: bool) -> Result<(), PolicyError> {
    for service in MANAGED_SERVICES {
        if auto_restarts {
            policy.unblock(service)?;
        } else {
            policy.block(service, &BLOCKED_ACTIONS)?;
        }
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct PolicyDocument {
    #[serde(default)]
    blocked_actions: BTreeMap<String, Vec<String>>,
    policy_requestor_name: String,
    policy_requestor_type: String,
}

/// YAML policy file at `<policy-dir>/<application-name>.policy`.
///
/// The file is removed once nothing is blocked.
pub struct PolicyRcdFile {
    path: PathBuf,
    requestor_name: String,
    lock: Mutex<()>,
}

impl PolicyRcdFile {
    pub fn new(policy_dir: &Path, requestor_name: &str) -> Self {
        Self {
            path: policy_dir.join(format!("{}.policy", requestor_name)),
            requestor_name: requestor_name.to_string(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Currently blocked actions, by service.
    pub fn blocked(&self) -> Result<BTreeMap<String, Vec<String>>, PolicyError> {
        Ok(self.read()?.blocked_actions)
    }

    fn read(&self) -> Result<PolicyDocument, PolicyError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_yaml::from_str(&text).map_err(|source| PolicyError::Yaml {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PolicyDocument {
                blocked_actions: BTreeMap::new(),
                policy_requestor_name: self.requestor_name.clone(),
                policy_requestor_type: REQUESTOR_TYPE.to_string(),
            }),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn write(&self, doc: &PolicyDocument) -> Result<(), PolicyError> {
        if doc.blocked_actions.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => {
                    tracing::info!(path = %self.path.display(), "Removed restart policy");
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(self.io_error(source)),
            };
        }
        let text = serde_yaml::to_string(doc).map_err(|source| PolicyError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        fs::write(&self.path, text).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> PolicyError {
        PolicyError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl RestartPolicy for PolicyRcdFile {
    fn block(&self, service: &str, actions: &[&str]) -> Result<(), PolicyError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.read()?;
        let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
        if doc.blocked_actions.get(service) == Some(&actions) {
            return Ok(());
        }
        tracing::info!(service, ?actions, "Blocking service actions");
        doc.blocked_actions.insert(service.to_string(), actions);
        self.write(&doc)
    }

    fn unblock(&self, service: &str) -> Result<(), PolicyError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.read()?;
        if doc.blocked_actions.remove(service).is_none() {
            return Ok(());
        }
        tracing::info!(service, "Unblocking service actions");
        self.write(&doc)
    }
}
