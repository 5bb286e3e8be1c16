//! Trigger dispatch.
//!
//! # Responsibilities
//! - Feed triggers to the orchestrator strictly one at a time
//! - Keep deferred deliveries and hand them back before the next trigger
//! - Persist the reconciliation state after every delivery
//!
//! # Design Decisions
//! - Synchronous: the daemon calls in from `block_in_place`, the CLI directly
//! - A redelivered trigger carries `redelivered = true`, so a handler can
//!   decide to defer only once

use std::collections::VecDeque;

use crate::config::ConnectorConfig;
use crate::reconcile::{
    Delivery, Orchestrator, Outcome, Reconciled, ReconciliationState, StateStore, Trigger,
};
use crate::reconcile::state::StateError;

pub struct Dispatcher {
    orchestrator: Orchestrator,
    store: StateStore,
    state: ReconciliationState,
    deferred: VecDeque<Trigger>,
}

impl Dispatcher {
    /// Resume from the state kept in `store`.
    pub fn new(orchestrator: Orchestrator, store: StateStore) -> Result<Self, StateError> {
        let state = store.load()?;
        tracing::debug!(?state, path = %store.path().display(), "Loaded reconciliation state");
        Ok(Self {
            orchestrator,
            store,
            state,
            deferred: VecDeque::new(),
        })
    }

    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Deliveries waiting to be handed back.
    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    /// Redeliver anything deferred, then deliver `trigger`.
    pub fn dispatch(&mut self, trigger: Trigger, config: &ConnectorConfig) -> Outcome {
        let waiting = std::mem::take(&mut self.deferred);
        for earlier in waiting {
            tracing::debug!(trigger = %earlier, "Redelivering deferred trigger");
            self.deliver(Delivery::redelivery(earlier), config);
        }
        self.deliver(Delivery::new(trigger), config)
    }

    fn deliver(&mut self, delivery: Delivery, config: &ConnectorConfig) -> Outcome {
        let Reconciled { state, outcome } =
            self.orchestrator.handle(delivery, config, self.state.clone());
        self.state = state;
        if let Err(e) = self.store.save(&self.state) {
            tracing::error!(error = %e, "Failed to persist reconciliation state");
        }
        if outcome == Outcome::Deferred {
            self.deferred.push_back(delivery.trigger);
        }
        outcome
    }
}
