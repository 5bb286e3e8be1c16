//! Fibre Channel host bus adapter scanning.
//!
//! Writing `- - -` to `/sys/class/scsi_host/<adapter>/scan` asks the
//! adapter to re-enumerate every channel, target and LUN.

use std::fs;
use std::io;
use std::path::PathBuf;

const SCAN_ALL: &str = "- - -";

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("No scsi devices were found. Scan aborted")]
    NoAdapters,

    #[error("Scan of the HBA adapters failed on the host.")]
    Write {
        adapter: String,
        #[source]
        source: io::Error,
    },
}

/// Scans every adapter under a `scsi_host` class directory.
#[derive(Debug, Clone)]
pub struct ScsiHostScanner {
    root: PathBuf,
}

impl ScsiHostScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Adapter names, sorted. An unreadable directory yields none.
    pub fn adapters(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(path = %self.root.display(), error = %e, "Cannot list scsi hosts");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Trigger a scan on every adapter, stopping at the first failure.
    ///
    /// Returns the number of adapters scanned.
    pub fn scan_all(&self) -> Result<usize, ScanError> {
        let adapters = self.adapters();
        tracing::debug!(?adapters, "hba adapters");
        if adapters.is_empty() {
            tracing::info!("No scsi devices were found. Scan aborted");
            return Err(ScanError::NoAdapters);
        }

        for adapter in &adapters {
            tracing::info!(adapter = %adapter, "Running scan of the host to discover LUN devices");
            let scan_file = self.root.join(adapter).join("scan");
            // sysfs attributes exist already; never create one.
            let result = fs::OpenOptions::new()
                .write(true)
                .open(&scan_file)
                .and_then(|mut f| io::Write::write_all(&mut f, SCAN_ALL.as_bytes()));
            if let Err(source) = result {
                tracing::error!(adapter = %adapter, error = %source, "An error occurred during the scan of the hosts");
                return Err(ScanError::Write {
                    adapter: adapter.clone(),
                    source,
                });
            }
        }
        Ok(adapters.len())
    }
}
