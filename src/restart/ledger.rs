//! Deferred restart ledger.
//!
//! # Responsibilities
//! - Record restarts that were due but held back by operator policy
//! - Answer "what is still pending" for status and actions
//! - Forget a deferral once the service has restarted by other means
//!
//! # Design Decisions
//! - Keyed by service name; repeated deferrals accumulate, `clear` drops them all
//! - Every mutation is persisted immediately; `reload` picks up changes made by
//!   other processes (the action CLI runs out of process)
//! - Entries are never expired

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::host::systemd::{ServiceStartTimes, ServiceTimeError};
use crate::observability::metrics;

/// Requestor type stamped on every event written by this agent.
pub const REQUESTOR_TYPE: &str = "application";

/// One held-back restart. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredRestartEvent {
    /// Seconds since the epoch at which the restart was deferred.
    pub timestamp: i64,
    pub service: String,
    /// `triggered by: <event>`
    pub reason: String,
    pub action: String,
    pub requestor_name: String,
    pub requestor_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger file error: {0}")]
    Io(#[from] io::Error),

    #[error("ledger file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    ServiceTime(#[from] ServiceTimeError),
}

/// File-backed set of deferred restarts, shared by clone.
#[derive(Clone, Debug)]
pub struct DeferredRestartLedger {
    inner: Arc<DashMap<String, Vec<DeferredRestartEvent>>>,
    persistence_path: Option<PathBuf>,
    requestor_name: String,
}

impl DeferredRestartLedger {
    /// An empty, in-memory ledger.
    pub fn new(requestor_name: impl Into<String>, persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            requestor_name: requestor_name.into(),
        }
    }

    /// Open the ledger stored at `path`; a missing file is an empty ledger.
    pub fn open(path: &Path, requestor_name: impl Into<String>) -> Result<Self, LedgerError> {
        let ledger = Self::new(requestor_name, Some(path.to_path_buf()));
        ledger.reload()?;
        Ok(ledger)
    }

    /// Replace the in-memory view with the file contents.
    pub fn reload(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let events: Vec<DeferredRestartEvent> = match File::open(path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut by_service: HashMap<String, Vec<DeferredRestartEvent>> = HashMap::new();
        for event in events {
            by_service.entry(event.service.clone()).or_default().push(event);
        }
        self.inner.clear();
        for (service, events) in by_service {
            self.inner.insert(service, events);
        }
        tracing::debug!(entries = self.len(), path = %path.display(), "Loaded deferred restarts");
        metrics::record_deferred_restarts(self.len());
        Ok(())
    }

    fn save(&self) -> Result<(), LedgerError> {
        metrics::record_deferred_restarts(self.len());
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let events = self.list(None);
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &events)?;
        tracing::debug!(entries = events.len(), path = %path.display(), "Saved deferred restarts");
        Ok(())
    }

    /// Name written as requestor on new events.
    pub fn requestor_name(&self) -> &str {
        &self.requestor_name
    }

    /// Record a deferred restart of each service, stamped now.
    pub fn defer(&self, services: &[&str], reason: &str) -> Result<(), LedgerError> {
        self.defer_at(services, reason, chrono::Utc::now().timestamp())
    }

    /// Record a deferred restart of each service at `timestamp`.
    pub fn defer_at(&self, services: &[&str], reason: &str, timestamp: i64) -> Result<(), LedgerError> {
        for service in services {
            tracing::info!(service, reason, "Deferring service restart");
            let event = DeferredRestartEvent {
                timestamp,
                service: service.to_string(),
                reason: format!("triggered by: {}", reason),
                action: "restart".to_string(),
                requestor_name: self.requestor_name.clone(),
                requestor_type: REQUESTOR_TYPE.to_string(),
            };
            self.inner.entry(service.to_string()).or_default().push(event);
        }
        self.save()
    }

    /// Every entry, optionally only those of one requestor, ordered by
    /// timestamp then service.
    pub fn list(&self, requestor: Option<&str>) -> Vec<DeferredRestartEvent> {
        let mut events: Vec<DeferredRestartEvent> = self
            .inner
            .iter()
            .flat_map(|r| r.value().clone())
            .filter(|e| requestor.map_or(true, |name| e.requestor_name == name))
            .collect();
        events.sort_by(|a, b| (a.timestamp, &a.service).cmp(&(b.timestamp, &b.service)));
        events
    }

    /// Unique, sorted names of services with pending restarts.
    pub fn services(&self, requestor: Option<&str>) -> Vec<String> {
        let mut services: Vec<String> = self.list(requestor).into_iter().map(|e| e.service).collect();
        services.sort();
        services.dedup();
        services
    }

    /// Drop every entry for the given services. Unknown services are ignored.
    pub fn clear(&self, services: &[&str]) -> Result<(), LedgerError> {
        let mut removed = 0;
        for service in services {
            if let Some((_, events)) = self.inner.remove(*service) {
                removed += events.len();
                tracing::info!(service, entries = events.len(), "Cleared deferred restarts");
            }
        }
        if removed == 0 {
            return Ok(());
        }
        self.save()
    }

    /// Clear services that have started since they were deferred.
    ///
    /// Returns the services cleared. A failed start-time lookup aborts the
    /// check; entries cleared before the failure stay cleared.
    pub fn check_restart_timestamps(
        &self,
        clock: &dyn ServiceStartTimes,
    ) -> Result<Vec<String>, LedgerError> {
        let mut pending: Vec<(String, i64)> = self
            .inner
            .iter()
            .filter_map(|r| {
                let earliest = r.value().iter().map(|e| e.timestamp).min()?;
                Some((r.key().clone(), earliest))
            })
            .collect();
        pending.sort();

        let mut cleared = Vec::new();
        for (service, deferred_at) in pending {
            match clock.active_since(&service)? {
                Some(started) if started > deferred_at => {
                    tracing::info!(
                        service = %service,
                        started,
                        deferred_at,
                        "Service restarted since deferral"
                    );
                    self.clear(&[service.as_str()])?;
                    cleared.push(service);
                }
                started => {
                    tracing::debug!(service = %service, ?started, deferred_at, "Restart still pending");
                }
            }
        }
        Ok(cleared)
    }

    /// Number of events across all services.
    pub fn len(&self) -> usize {
        self.inner.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedClock(HashMap<&'static str, Option<i64>>);

    impl ServiceStartTimes for FixedClock {
        fn active_since(&self, service: &str) -> Result<Option<i64>, ServiceTimeError> {
            match self.0.get(service) {
                Some(v) => Ok(*v),
                None => Err(ServiceTimeError::Parse {
                    service: service.to_string(),
                    value: "n/a".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_defer_and_list() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["iscsid", "open-iscsi"], "config changed", 100).unwrap();

        let events = ledger.list(None);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].service, "iscsid");
        assert_eq!(events[0].reason, "triggered by: config changed");
        assert_eq!(events[0].action, "restart");
        assert_eq!(events[0].requestor_name, "storage-connector");
        assert_eq!(events[0].requestor_type, "application");
        assert_eq!(events[1].service, "open-iscsi");
    }

    #[test]
    fn test_list_ordering_and_filter() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["open-iscsi"], "config changed", 200).unwrap();
        ledger.defer_at(&["iscsid"], "config changed", 300).unwrap();
        ledger.defer_at(&["multipathd"], "start", 100).unwrap();

        let order: Vec<_> = ledger.list(None).into_iter().map(|e| e.service).collect();
        assert_eq!(order, vec!["multipathd", "open-iscsi", "iscsid"]);
        assert_eq!(ledger.list(Some("storage-connector")).len(), 3);
        assert!(ledger.list(Some("someone-else")).is_empty());
    }

    #[test]
    fn test_repeated_deferrals_accumulate() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["iscsid"], "config changed", 100).unwrap();
        ledger.defer_at(&["iscsid"], "config changed", 200).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.services(None), vec!["iscsid"]);

        ledger.clear(&["iscsid"]).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["iscsid", "open-iscsi"], "config changed", 100).unwrap();
        ledger.clear(&["iscsid"]).unwrap();
        ledger.clear(&["iscsid", "unknown"]).unwrap();
        assert_eq!(ledger.services(None), vec!["open-iscsi"]);
    }

    #[test]
    fn test_check_restart_timestamps() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["iscsid", "open-iscsi", "multipathd"], "config changed", 1000).unwrap();

        let clock = FixedClock(HashMap::from([
            ("iscsid", Some(1001)),
            ("open-iscsi", Some(1000)),
            ("multipathd", None),
        ]));
        let cleared = ledger.check_restart_timestamps(&clock).unwrap();
        assert_eq!(cleared, vec!["iscsid"]);
        assert_eq!(ledger.services(None), vec!["multipathd", "open-iscsi"]);
    }

    #[test]
    fn test_check_restart_timestamps_propagates_lookup_failure() {
        let ledger = DeferredRestartLedger::new("storage-connector", None);
        ledger.defer_at(&["iscsid"], "config changed", 1000).unwrap();
        let clock = FixedClock(HashMap::new());
        assert!(matches!(
            ledger.check_restart_timestamps(&clock),
            Err(LedgerError::ServiceTime(_))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("deferred-restarts.json");

        let ledger = DeferredRestartLedger::open(&path, "storage-connector").unwrap();
        assert!(ledger.is_empty());
        ledger.defer_at(&["iscsid"], "config changed", 100).unwrap();

        // another process sees the write, and its clear is observed after reload
        let other = DeferredRestartLedger::open(&path, "storage-connector").unwrap();
        assert_eq!(other.list(None), ledger.list(None));
        other.clear(&["iscsid"]).unwrap();

        assert_eq!(ledger.len(), 1);
        ledger.reload().unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deferred-restarts.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            DeferredRestartLedger::open(&path, "storage-connector"),
            Err(LedgerError::Json(_))
        ));
    }
}
