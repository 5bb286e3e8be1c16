//! iSCSI initiator identity.
//!
//! # Responsibilities
//! - Resolve the IQN this host presents to targets
//! - Render and write `initiatorname.iscsi`, only when the IQN changes
//!
//! # Resolution order
//! 1. `initiator-dictionary` entry for this host's FQDN
//! 2. the IQN already on disk
//! 3. a fresh one from `iscsi-iname`

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::host::exec::ExecutionError;
use crate::host::fs::write_if_changed;
use crate::host::iscsiadm::Iscsiadm;

const HEADER: &str = "\
## DO NOT EDIT OR REMOVE THIS FILE!
## If you remove this file, the iSCSI daemon will not start.
## If you change the InitiatorName, existing access control lists
## may reject this initiator.  The InitiatorName must be unique
## for each iSCSI initiator.  Do NOT duplicate iSCSI InitiatorNames.
";

const FILE_MODE: u32 = 0o600;

#[derive(Debug, thiserror::Error)]
pub enum InitiatorError {
    #[error("initiator-dictionary is not a JSON object of strings: {0}")]
    Dictionary(#[from] serde_json::Error),

    #[error("cannot generate an initiator name: {0}")]
    Generate(#[from] ExecutionError),

    #[error("cannot write initiator name: {0}")]
    Io(#[from] io::Error),
}

/// Where the resolved IQN came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorSource {
    Dictionary,
    Existing,
    Generated,
}

/// Pick the IQN for `hostname`. `generate` is only called as a last resort.
pub fn resolve<F>(
    dictionary: Option<&str>,
    hostname: &str,
    existing: Option<&str>,
    generate: F,
) -> Result<(String, InitiatorSource), InitiatorError>
where
    F: FnOnce() -> Result<String, ExecutionError>,
{
    if let Some(text) = dictionary.filter(|t| !t.trim().is_empty()) {
        let initiators: HashMap<String, String> = serde_json::from_str(text)?;
        if let Some(name) = initiators.get(hostname) {
            return Ok((name.clone(), InitiatorSource::Dictionary));
        }
    }
    if let Some(name) = existing {
        tracing::info!(hostname, "Hostname not in the initiator dictionary, keeping the current initiator name");
        return Ok((name.to_string(), InitiatorSource::Existing));
    }

    let name = generate()?;
    tracing::warn!(
        initiator = %name,
        hostname,
        "Hostname not found in the initiator dictionary, a random IQN will be used"
    );
    Ok((name, InitiatorSource::Generated))
}

/// Render the identity file.
pub fn render(initiator_name: &str) -> String {
    format!("{}InitiatorName={}\n", HEADER, initiator_name)
}

/// The `InitiatorName=` value of an existing identity file.
pub fn read_current(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .find_map(|line| line.trim().strip_prefix("InitiatorName="))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Resolve the IQN and rewrite `path` if it differs from the one on disk.
///
/// Returns whether the file changed.
pub fn ensure(
    path: &Path,
    dictionary: Option<&str>,
    hostname: &str,
    iscsiadm: &Iscsiadm,
) -> Result<bool, InitiatorError> {
    let current = read_current(path);
    let (name, source) = resolve(dictionary, hostname, current.as_deref(), || {
        iscsiadm.generate_initiator_name()
    })?;

    if current.as_deref() == Some(name.as_str()) {
        tracing::debug!(initiator = %name, ?source, "Initiator name unchanged");
        return Ok(false);
    }
    tracing::info!(initiator = %name, ?source, "Rendering initiatorname.iscsi");
    Ok(write_if_changed(path, &render(&name), FILE_MODE)?)
}
