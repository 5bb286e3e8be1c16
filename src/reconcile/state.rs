//! Reconciliation state, persisted between runs.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::StorageType;

/// Where the last reconciliation got to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Unconfigured,
    Validating,
    Blocked,
    Rendering,
    Restarting,
    Ready,
}

/// Operator-facing unit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    Maintenance(String),
    Blocked(String),
    Active(String),
}

impl UnitStatus {
    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Maintenance(m) | UnitStatus::Blocked(m) | UnitStatus::Active(m) => m,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, UnitStatus::Blocked(_))
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        UnitStatus::Maintenance("Unconfigured".to_string())
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Blocked(_) => "blocked",
            UnitStatus::Active(_) => "active",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

/// Flags and status carried from one reconciliation to the next.
///
/// The boolean flags only ever go from false to true; `storage_type` is fixed
/// by the first successful validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationState {
    pub installed: bool,
    pub configured: bool,
    pub started: bool,
    pub fc_scan_ran_once: bool,
    pub storage_type: Option<StorageType>,
    /// Fingerprint of the configuration last applied to the services.
    pub applied_config: Option<String>,
    pub phase: Phase,
    pub status: UnitStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} is corrupt: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON file holding the [`ReconciliationState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored state; a missing file is a fresh host.
    pub fn load(&self) -> Result<ReconciliationState, StateError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ReconciliationState::default());
            }
            Err(source) => return Err(self.io_error(source)),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StateError::Json {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, state: &ReconciliationState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let file = File::create(&self.path).map_err(|source| self.io_error(source))?;
        serde_json::to_writer_pretty(BufWriter::new(file), state).map_err(|source| {
            StateError::Json {
                path: self.path.clone(),
                source,
            }
        })
    }

    fn io_error(&self, source: io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
