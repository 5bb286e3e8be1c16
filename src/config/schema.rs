//! Configuration schema definitions.
//!
//! This module defines the desired state of the host's storage connection.
//! Option names are kebab-case and match the names operators see in
//! blocking status messages.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Block-storage transport in use on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Iscsi,
    Fc,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Iscsi => "iscsi",
            StorageType::Fc => "fc",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iscsi" => Ok(StorageType::Iscsi),
            "fc" => Ok(StorageType::Fc),
            other => Err(format!("unknown storage type {:?}", other)),
        }
    }
}

/// Root configuration for the storage connector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConnectorConfig {
    /// Requested transport, `iscsi` or `fc`. Kept raw so bad values block instead of failing to load.
    pub storage_type: Option<String>,

    /// Name recorded as requestor on deferred restarts and used for managed file names.
    pub application_name: String,

    /// iSCSI target portal address.
    pub iscsi_target: Option<String>,

    /// iSCSI target portal port.
    pub iscsi_port: Option<u16>,

    /// Run discovery and login after restarting the iSCSI services.
    pub iscsi_discovery_and_login: bool,

    /// JSON object mapping host FQDNs to initiator IQNs.
    pub initiator_dictionary: Option<String>,

    pub iscsi_node_startup: String,
    pub iscsi_node_session_iscsi_fastabort: String,
    pub iscsi_node_session_scan: String,
    pub iscsi_node_session_auth_authmethod: Option<String>,
    pub iscsi_node_session_auth_username: Option<String>,
    pub iscsi_node_session_auth_password: Option<String>,
    pub iscsi_node_session_auth_username_in: Option<String>,
    pub iscsi_node_session_auth_password_in: Option<String>,

    /// Alias given to the Fibre Channel LUN in the multipaths section.
    pub fc_lun_alias: Option<String>,

    /// JSON object for the multipath `defaults` section.
    pub multipath_defaults: Option<String>,

    /// JSON object, or array of objects, for multipath `devices`.
    pub multipath_devices: Option<String>,

    /// JSON object, or array of objects, for multipath `blacklist`.
    pub multipath_blacklist: Option<String>,

    /// Restart services as soon as their configuration changes.
    pub enable_auto_restarts: bool,

    /// Expected number of paths per multipath volume for the path check.
    pub nagios_multipath_paths_per_volume: u32,

    /// Host filesystem locations.
    pub paths: PathsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            storage_type: None,
            application_name: "storage-connector".to_string(),
            iscsi_target: None,
            iscsi_port: None,
            iscsi_discovery_and_login: false,
            initiator_dictionary: None,
            iscsi_node_startup: "automatic".to_string(),
            iscsi_node_session_iscsi_fastabort: "Yes".to_string(),
            iscsi_node_session_scan: "auto".to_string(),
            iscsi_node_session_auth_authmethod: None,
            iscsi_node_session_auth_username: None,
            iscsi_node_session_auth_password: None,
            iscsi_node_session_auth_username_in: None,
            iscsi_node_session_auth_password_in: None,
            fc_lun_alias: None,
            multipath_defaults: None,
            multipath_devices: None,
            multipath_blacklist: None,
            enable_auto_restarts: true,
            nagios_multipath_paths_per_volume: 0,
            paths: PathsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ConnectorConfig {
    /// Whether the named option carries a non-blank value.
    ///
    /// Unknown names are reported as unset.
    pub fn is_set(&self, option: &str) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
        }
        match option {
            "storage-type" => present(&self.storage_type),
            "iscsi-target" => present(&self.iscsi_target),
            "iscsi-port" => self.iscsi_port.is_some(),
            "initiator-dictionary" => present(&self.initiator_dictionary),
            "fc-lun-alias" => present(&self.fc_lun_alias),
            "multipath-defaults" => present(&self.multipath_defaults),
            "multipath-devices" => present(&self.multipath_devices),
            "multipath-blacklist" => present(&self.multipath_blacklist),
            "iscsi-node-session-auth-authmethod" => present(&self.iscsi_node_session_auth_authmethod),
            "iscsi-node-session-auth-username" => present(&self.iscsi_node_session_auth_username),
            "iscsi-node-session-auth-password" => present(&self.iscsi_node_session_auth_password),
            "iscsi-node-session-auth-username-in" => present(&self.iscsi_node_session_auth_username_in),
            "iscsi-node-session-auth-password-in" => present(&self.iscsi_node_session_auth_password_in),
            _ => false,
        }
    }

    /// Hex SHA-256 of every option that shapes the host configuration.
    ///
    /// Host paths, observability and the path-check threshold are left out, so
    /// only changes an operator makes to the storage setup alter the digest.
    /// Keys serialize sorted, which keeps the digest stable across runs.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(options) = value.as_object_mut() {
            for key in ["paths", "observability", "nagios-multipath-paths-per-volume"] {
                options.remove(key);
            }
        }
        let digest = Sha256::digest(serde_json::to_vec(&value)?);
        Ok(format!("{:x}", digest))
    }

    /// Raw text of one of the structured multipath sections.
    pub fn multipath_section(&self, section: &str) -> Option<&str> {
        let value = match section {
            "defaults" => &self.multipath_defaults,
            "devices" => &self.multipath_devices,
            "blacklist" => &self.multipath_blacklist,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }
}

/// Host filesystem locations. Relocatable so tests can run against a scratch tree.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathsConfig {
    /// open-iscsi configuration directory.
    pub iscsi_dir: PathBuf,

    /// multipath-tools configuration directory; drop-ins go to `conf.d`.
    pub multipath_dir: PathBuf,

    /// sysfs class directory holding one entry per SCSI host adapter.
    pub scsi_host_dir: PathBuf,

    /// Where the reconciliation state and deferred restarts are kept.
    pub state_dir: PathBuf,

    /// Directory of restart-block policy files.
    pub policy_dir: PathBuf,

    /// Present only on hosts booted with systemd.
    pub systemd_run_dir: PathBuf,

    /// Marker written by upstart inside containers.
    pub container_marker: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            iscsi_dir: PathBuf::from("/etc/iscsi"),
            multipath_dir: PathBuf::from("/etc/multipath"),
            scsi_host_dir: PathBuf::from("/sys/class/scsi_host"),
            state_dir: PathBuf::from("/var/lib/storage-connector"),
            policy_dir: PathBuf::from("/etc/policy-rc.d"),
            systemd_run_dir: PathBuf::from("/run/systemd/system"),
            container_marker: PathBuf::from("/run/container_type"),
        }
    }
}

impl PathsConfig {
    pub fn iscsid_conf(&self) -> PathBuf {
        self.iscsi_dir.join("iscsid.conf")
    }

    pub fn initiator_name(&self) -> PathBuf {
        self.iscsi_dir.join("initiatorname.iscsi")
    }

    pub fn multipath_conf_dir(&self) -> PathBuf {
        self.multipath_dir.join("conf.d")
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn ledger_file(&self) -> PathBuf {
        self.state_dir.join("deferred-restarts.json")
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,

    /// Seconds between periodic status assessments.
    pub update_status_interval_secs: u64,

    /// Seconds between multipath topology samples for metrics.
    pub topology_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            update_status_interval_secs: 300,
            topology_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_storage_options_only() {
        let base = ConnectorConfig {
            storage_type: Some("iscsi".into()),
            iscsi_target: Some("10.0.0.5".into()),
            ..Default::default()
        };
        let digest = base.fingerprint().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(base.clone().fingerprint().unwrap(), digest);

        let mut moved = base.clone();
        moved.iscsi_target = Some("10.0.0.6".into());
        assert_ne!(moved.fingerprint().unwrap(), digest);

        let mut multipath = base.clone();
        multipath.multipath_defaults = Some(r#"{"user_friendly_names": "yes"}"#.into());
        assert_ne!(multipath.fingerprint().unwrap(), digest);

        let mut relocated = base.clone();
        relocated.paths.state_dir = PathBuf::from("/tmp/state");
        relocated.observability.log_level = "debug".into();
        relocated.nagios_multipath_paths_per_volume = 4;
        assert_eq!(relocated.fingerprint().unwrap(), digest);
    }

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert!(config.enable_auto_restarts);
        assert_eq!(config.application_name, "storage-connector");
        assert_eq!(config.paths.multipath_conf_dir(), PathBuf::from("/etc/multipath/conf.d"));
    }

    #[test]
    fn test_kebab_case_keys() {
        let config: ConnectorConfig = toml::from_str(
            r#"
            storage-type = "iscsi"
            iscsi-target = "10.0.0.5"
            iscsi-port = 3260
            multipath-devices = '{"vendor": "PURE"}'
            enable-auto-restarts = false

            [paths]
            state-dir = "/tmp/state"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_type.as_deref(), Some("iscsi"));
        assert_eq!(config.iscsi_port, Some(3260));
        assert!(!config.enable_auto_restarts);
        assert_eq!(config.paths.state_dir, PathBuf::from("/tmp/state"));
        assert_eq!(config.paths.iscsi_dir, PathBuf::from("/etc/iscsi"));
    }

    #[test]
    fn test_blank_is_unset() {
        let config = ConnectorConfig {
            iscsi_target: Some("  ".into()),
            fc_lun_alias: Some("data1".into()),
            ..Default::default()
        };
        assert!(!config.is_set("iscsi-target"));
        assert!(config.is_set("fc-lun-alias"));
        assert!(!config.is_set("no-such-option"));
    }

    #[test]
    fn test_storage_type_parse() {
        assert_eq!("fc".parse::<StorageType>(), Ok(StorageType::Fc));
        assert!("ISCSI".parse::<StorageType>().is_err());
    }
}
