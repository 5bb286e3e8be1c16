//! Nagios-style multipath path-count check.
//!
//! Scrapes the metrics endpoint and compares `iscsi_multipath_path_total`
//! for every alias against the expected number of paths per volume.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::observability::metrics::PATH_TOTAL;

pub const DEFAULT_URL: &str = "http://127.0.0.1:9090/";

static ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"alias="([^"]+)""#).expect("alias regex is valid"));

/// Plugin exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NagiosStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl NagiosStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            NagiosStatus::Ok => 0,
            NagiosStatus::Warning => 1,
            NagiosStatus::Critical => 2,
            NagiosStatus::Unknown => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NagiosStatus::Ok => "OK",
            NagiosStatus::Warning => "WARNING",
            NagiosStatus::Critical => "CRITICAL",
            NagiosStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Status plus the one-line message a plugin prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub status: NagiosStatus,
    pub message: String,
}

impl CheckResult {
    fn critical(message: impl Into<String>) -> Self {
        Self {
            status: NagiosStatus::Critical,
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.label(), self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Cannot scrape metrics: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Metric: {0} not found")]
    MetricNotFound(&'static str),

    #[error("Malformed metric line: {0}")]
    Malformed(String),
}

/// Path totals keyed by alias, from Prometheus text exposition.
pub fn paths_per_alias(body: &str) -> Result<BTreeMap<String, u64>, CheckError> {
    let mut totals = BTreeMap::new();
    for line in body.lines().filter(|l| l.starts_with(PATH_TOTAL)) {
        let alias = ALIAS_REGEX
            .captures(line)
            .map(|c| c[1].to_string())
            .ok_or_else(|| CheckError::Malformed(line.to_string()))?;
        let paths = line
            .split_whitespace()
            .last()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| CheckError::Malformed(line.to_string()))?;
        totals.insert(alias, paths as u64);
    }
    if totals.is_empty() {
        return Err(CheckError::MetricNotFound(PATH_TOTAL));
    }
    Ok(totals)
}

/// Compare every alias against `expected`; the first mismatch is critical.
pub fn evaluate(totals: &BTreeMap<String, u64>, expected: u64) -> CheckResult {
    for (alias, paths) in totals {
        if *paths != expected {
            return CheckResult::critical(format!(
                "Expected {} paths for {} but found {}.",
                expected, alias, paths
            ));
        }
    }
    CheckResult {
        status: NagiosStatus::Ok,
        message: "Correct number of paths found.".to_string(),
    }
}

pub async fn fetch_metrics(url: &str) -> Result<String, CheckError> {
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    Ok(body)
}

/// Run the whole check. Scrape and parse failures are critical.
pub async fn check_multipath(url: &str, expected: u64) -> CheckResult {
    let totals = match fetch_metrics(url).await {
        Ok(body) => paths_per_alias(&body),
        Err(e) => Err(e),
    };
    match totals {
        Ok(totals) => evaluate(&totals, expected),
        Err(e) => {
            tracing::debug!(error = %e, url, "Multipath check failed");
            CheckResult::critical(e.to_string())
        }
    }
}
