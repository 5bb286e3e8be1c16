//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per reconciliation)
//!     → metrics.rs (path counts, ledger size, reconciliations, restarts)
//!
//! Consumers:
//!     → stdout / journald
//!     → Prometheus scrape of the metrics endpoint
//!     → check.rs (Nagios-style path-count check over the same endpoint)
//! ```

pub mod check;
pub mod logging;
pub mod metrics;
