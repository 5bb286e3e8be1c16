//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! Delivery (trigger.rs)
//!     → orchestrator.rs handle(delivery, config, state)
//!     → Reconciled { state, outcome }
//!     → state.rs StateStore (persisted for the next run)
//!
//! Operator actions (actions.rs) share the orchestrator's host and ledger.
//! ```
//!
//! # Phases
//! `Unconfigured → Validating → (Blocked | Rendering) → Restarting → Ready`

pub mod actions;
pub mod orchestrator;
pub mod state;
pub mod trigger;

pub use orchestrator::{Orchestrator, Reconciled};
pub use state::{Phase, ReconciliationState, StateStore, UnitStatus};
pub use trigger::{BlockReason, Delivery, Outcome, Trigger};
