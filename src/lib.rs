//! Storage connector library
//!
//! Reconciles a host's block-storage transport (iSCSI or Fibre Channel,
//! multiplexed through dm-multipath) against a declarative configuration,
//! and holds service restarts back when the operator asks it to.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ config ──▶ lifecycle::Dispatcher ──▶ reconcile::Orchestrator
//!   (watcher, SIGHUP)             (one trigger at a time)        │
//!                                                                 ├──▶ iscsi      (initiatorname.iscsi, iscsid.conf)
//!                                                                 ├──▶ multipath  (drop-in rendering, `multipath -ll` parsing)
//!                                                                 ├──▶ restart    (deferral ledger, restart policy, status)
//!                                                                 └──▶ host       (systemctl, iscsiadm, apt, sysfs)
//!
//!   connector-cli ──▶ reconcile::actions ──▶ same host and ledger
//!   observability: tracing logs, Prometheus metrics, path-count check
//! ```

// Core subsystems
pub mod config;
pub mod reconcile;
pub mod restart;

// Managed configuration
pub mod iscsi;
pub mod multipath;

// Host integration
pub mod host;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ConnectorConfig;
pub use lifecycle::Dispatcher;
pub use reconcile::Orchestrator;
