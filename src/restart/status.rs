//! Active status message.

use crate::restart::ledger::DeferredRestartLedger;

pub const READY: &str = "Unit is ready";

/// Status message for a unit that is up and configured.
///
/// Pending restarts are only advertised while auto-restarts are off, since
/// they are otherwise applied on the spot.
pub fn compose_status(ledger: &DeferredRestartLedger, requestor: &str, auto_restarts: bool) -> String {
    if auto_restarts {
        return READY.to_string();
    }
    let services = ledger.services(Some(requestor));
    if services.is_empty() {
        return READY.to_string();
    }
    format!("{}. Services queued for restart: {}", READY, services.join(", "))
}
