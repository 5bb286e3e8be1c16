//! systemd service control.

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

use crate::host::exec::{BoxedRunner, ExecutionError};

const SYSTEMCTL: &str = "systemctl";

/// Errors looking up when a service last started.
#[derive(Debug, thiserror::Error)]
pub enum ServiceTimeError {
    #[error("cannot query start time of {service}: {source}")]
    Query {
        service: String,
        #[source]
        source: ExecutionError,
    },

    #[error("unparseable start time for {service}: {value:?}")]
    Parse { service: String, value: String },
}

/// Source of "active since" timestamps for services.
pub trait ServiceStartTimes {
    /// Epoch seconds at which `service` entered the active state, `None` if it is not running.
    fn active_since(&self, service: &str) -> Result<Option<i64>, ServiceTimeError>;
}

/// Wraps `systemctl`.
#[derive(Clone)]
pub struct Systemd {
    runner: BoxedRunner,
}

impl Systemd {
    pub fn new(runner: BoxedRunner) -> Self {
        Self { runner }
    }

    pub fn enable(&self, service: &str) -> Result<(), ExecutionError> {
        self.runner.run(SYSTEMCTL, &["enable", service]).map(|_| ())
    }

    pub fn restart(&self, service: &str) -> Result<(), ExecutionError> {
        self.runner.run(SYSTEMCTL, &["restart", service]).map(|_| ())
    }

    pub fn reload(&self, service: &str) -> Result<(), ExecutionError> {
        self.runner.run(SYSTEMCTL, &["reload", service]).map(|_| ())
    }
}

impl ServiceStartTimes for Systemd {
    fn active_since(&self, service: &str) -> Result<Option<i64>, ServiceTimeError> {
        let output = self
            .runner
            .run(
                SYSTEMCTL,
                &["show", service, "--property=ActiveEnterTimestamp"],
            )
            .map_err(|source| ServiceTimeError::Query {
                service: service.to_string(),
                source,
            })?;
        parse_active_enter_timestamp(&output.stdout).map_err(|value| ServiceTimeError::Parse {
            service: service.to_string(),
            value,
        })
    }
}

/// Parse `ActiveEnterTimestamp=Mon 2022-02-28 10:00:00 UTC`.
///
/// Zones other than UTC/GMT are read as host local time.
fn parse_active_enter_timestamp(stdout: &str) -> Result<Option<i64>, String> {
    let line = stdout.trim();
    let value = line
        .strip_prefix("ActiveEnterTimestamp=")
        .unwrap_or(line)
        .trim();
    if value.is_empty() || value == "n/a" {
        return Ok(None);
    }

    let mut parts: Vec<&str> = value.split_whitespace().collect();
    let zone = if parts.len() == 4 { parts.pop() } else { None };
    let stamp = parts.join(" ");
    let naive = NaiveDateTime::parse_from_str(&stamp, "%a %Y-%m-%d %H:%M:%S")
        .map_err(|_| value.to_string())?;

    let epoch = match zone {
        Some("UTC") | Some("GMT") | None => Utc.from_utc_datetime(&naive).timestamp(),
        Some(_) => Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| value.to_string())?
            .timestamp(),
    };
    Ok(Some(epoch))
}
