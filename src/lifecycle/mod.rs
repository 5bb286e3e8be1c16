//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (daemon):
//!     Load config → Install (first run only) → ConfigChanged → Start
//!
//! Running:
//!     config watcher / SIGHUP  → ConfigChanged
//!     update-status ticker     → UpdateStatus
//!     every trigger            → dispatcher.rs → orchestrator
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → leave the event loop
//!     SIGHUP → reload the config file
//! ```
//!
//! # Design Decisions
//! - One trigger at a time; deferred triggers go first
//! - A reconciliation in progress always finishes before shutdown

pub mod dispatcher;
pub mod signals;

pub use dispatcher::Dispatcher;
pub use signals::{SignalEvent, Signals};
