//! iSCSI initiator configuration files.
//!
//! ```text
//! ConnectorConfig + host FQDN
//!     → initiator.rs (initiatorname.iscsi, identity)
//!     → iscsid.rs (iscsid.conf, daemon and session settings)
//! ```
//!
//! Both files are written 0600; a change in either makes the iSCSI services
//! candidates for a restart.

pub mod initiator;
pub mod iscsid;

/// Services that must restart to pick up initiator changes.
pub const ISCSI_SERVICES: [&str; 2] = ["iscsid", "open-iscsi"];
