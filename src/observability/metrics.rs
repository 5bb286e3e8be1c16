//! Metrics collection and exposition.
//!
//! # Metrics
//! - `iscsi_multipath_path_total` (gauge): paths per multipath device, by alias and wwid
//! - `storage_connector_deferred_restarts` (gauge): entries in the deferred restart ledger
//! - `storage_connector_reconciliations_total` (counter): reconciliations by outcome
//! - `storage_connector_service_restarts_total` (counter): restarts by service and result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade, so without an installed
//!   recorder (tests, the CLI) every call is a no-op
//! - The exporter serves the Prometheus text format on its own listener
//! - A multipath map that leaves `multipath -ll` is exported as zero paths
//!   rather than keeping its last count

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{LazyLock, Mutex};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::multipath::MultipathDevice;

pub const PATH_TOTAL: &str = "iscsi_multipath_path_total";
const DEFERRED_RESTARTS: &str = "storage_connector_deferred_restarts";
const RECONCILIATIONS: &str = "storage_connector_reconciliations_total";
const SERVICE_RESTARTS: &str = "storage_connector_service_restarts_total";

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// `(alias, wwid)` labels of one path-count series.
type PathLabels = (String, String);

/// Path-count series exported by the previous sample.
#[derive(Debug, Default)]
pub struct PathGauges {
    exported: BTreeSet<PathLabels>,
}

impl PathGauges {
    /// Export `devices` and zero every series missing from them.
    pub fn record(&mut self, devices: &[MultipathDevice]) {
        let current: BTreeSet<PathLabels> = devices
            .iter()
            .map(|d| (d.alias.clone(), d.wwid.clone()))
            .collect();

        for (alias, wwid) in self.exported.difference(&current) {
            tracing::info!(alias = %alias, wwid = %wwid, "Multipath device gone, zeroing its path count");
            metrics::gauge!(PATH_TOTAL, "alias" => alias.clone(), "wwid" => wwid.clone()).set(0.0);
        }
        for device in devices {
            metrics::gauge!(
                PATH_TOTAL,
                "alias" => device.alias.clone(),
                "wwid" => device.wwid.clone()
            )
            .set(device.paths as f64);
        }
        self.exported = current;
    }
}

static PATH_GAUGES: LazyLock<Mutex<PathGauges>> = LazyLock::new(Mutex::default);

pub fn record_path_counts(devices: &[MultipathDevice]) {
    let mut gauges = PATH_GAUGES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    gauges.record(devices);
}

pub fn record_deferred_restarts(count: usize) {
    metrics::gauge!(DEFERRED_RESTARTS).set(count as f64);
}

pub fn record_reconciliation(outcome: &'static str) {
    metrics::counter!(RECONCILIATIONS, "outcome" => outcome).increment(1);
}

pub fn record_service_restart(service: &str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(
        SERVICE_RESTARTS,
        "service" => service.to_string(),
        "result" => result
    )
    .increment(1);
}
