//! Restart management subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator decides a restart is due
//!     → auto-restarts on:  restart now, ledger.rs clear
//!     → auto-restarts off: ledger.rs defer, policy.rs keeps the OS from restarting
//!
//! update-status / restart action
//!     → ledger.rs check_restart_timestamps (forget what restarted anyway)
//!     → status.rs compose_status
//! ```

pub mod ledger;
pub mod policy;
pub mod status;

pub use ledger::{DeferredRestartEvent, DeferredRestartLedger, LedgerError};
pub use policy::{PolicyError, PolicyRcdFile, RestartPolicy};
pub use status::compose_status;
