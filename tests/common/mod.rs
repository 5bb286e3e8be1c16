//! Shared fixtures for integration tests: a scratch host tree, a scripted
//! command runner and ready-made configurations.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use storage_connector::config::{ConnectorConfig, PathsConfig};
use storage_connector::host::{CommandOutput, FakeRunner};
use storage_connector::lifecycle::Dispatcher;
use storage_connector::reconcile::{Orchestrator, StateStore};

pub const FQDN: &str = "testhost.testdomain";
pub const ASSIGNED_IQN: &str = "iqn.2020-07.canonical.com:lun1";
pub const GENERATED_IQN: &str = "iqn.1993-08.org.debian:01:generated";

/// `multipath -ll` output for a single FC LUN.
pub const FC_TOPOLOGY: &str = r"diskname (360014380056efd060000d00000510000) dm-3 Vendor,StorageModel
[size=1.0G][features=1 queue_if_no_path][hwhandler=0][rw]
\_ round-robin 0 [prio=100][active]
\_ 0:0:0:1 sda 8:0   [active][ready]
\_ 1:0:1:1 sdd 8:48  [active][ready]
\_ round-robin 0 [prio=20][enabled]
\_ 0:0:1:1 sdb 8:16  [active][ready]
\_ 1:0:0:1 sdc 8:32  [active][ready]";

type Responses = Arc<Mutex<Vec<(String, CommandOutput)>>>;

/// A relocated host tree plus the runner every collaborator shares.
pub struct Scenario {
    pub dir: TempDir,
    pub runner: Arc<FakeRunner>,
    pub config: ConnectorConfig,
    responses: Responses,
}

impl Scenario {
    pub fn iscsi() -> Self {
        let mut scenario = Self::bare();
        scenario.config.storage_type = Some("iscsi".into());
        scenario.config.iscsi_target = Some("10.0.0.5".into());
        scenario.config.iscsi_port = Some(3260);
        scenario.config.initiator_dictionary =
            Some(format!(r#"{{"{}": "{}"}}"#, FQDN, ASSIGNED_IQN));
        scenario
    }

    pub fn fc() -> Self {
        let mut scenario = Self::bare();
        scenario.config.storage_type = Some("fc".into());
        scenario.config.fc_lun_alias = Some("data1".into());
        scenario
    }

    fn bare() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectorConfig {
            multipath_devices: Some(
                r#"{"vendor": "PURE", "product": "FlashArray", "path_grouping_policy": "group_by_prio"}"#
                    .into(),
            ),
            paths: paths(dir.path()),
            ..Default::default()
        };

        let responses: Responses = Arc::new(Mutex::new(Vec::new()));
        let runner = FakeRunner::new();
        let scripted = responses.clone();
        runner.set_handler(Box::new(move |inv| {
            let line = inv.line();
            let overrides = scripted.lock().unwrap();
            if let Some((_, output)) = overrides.iter().rev().find(|(prefix, _)| line.starts_with(prefix)) {
                return output.clone();
            }
            match inv.program.as_str() {
                "hostname" => CommandOutput::with_stdout(format!("{}\n", FQDN)),
                "/sbin/iscsi-iname" => CommandOutput::with_stdout(format!("{}\n", GENERATED_IQN)),
                "dpkg-query" => CommandOutput::with_stdout("install ok installed"),
                "systemctl" if inv.args.first().map(String::as_str) == Some("show") => {
                    CommandOutput::with_stdout("ActiveEnterTimestamp=n/a\n")
                }
                _ => CommandOutput::success(),
            }
        }));

        Self {
            dir,
            runner,
            config,
            responses,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Answer commands starting with `prefix` with `output`; later calls win.
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses.lock().unwrap().push((prefix.to_string(), output));
    }

    pub fn set_multipath_output(&self, text: &str) {
        self.respond("multipath -ll", CommandOutput::with_stdout(text));
    }

    /// Create `scsi_host/<name>/scan`.
    pub fn add_scsi_host(&self, name: &str) -> PathBuf {
        let dir = self.config.paths.scsi_host_dir.join(name);
        fs::create_dir_all(&dir).unwrap();
        let scan = dir.join("scan");
        fs::write(&scan, "").unwrap();
        scan
    }

    pub fn mark_container(&self) {
        let marker = &self.config.paths.container_marker;
        fs::create_dir_all(marker.parent().unwrap()).unwrap();
        fs::write(marker, "lxc").unwrap();
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::from_config(&self.config, self.runner.as_runner()).unwrap()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.orchestrator(), StateStore::new(self.config.paths.state_file())).unwrap()
    }

    /// `systemctl restart ...` lines run so far.
    pub fn restarts(&self) -> Vec<String> {
        self.runner.lines_starting_with("systemctl restart")
    }

    pub fn multipath_conf(&self) -> PathBuf {
        self.config
            .paths
            .multipath_conf_dir()
            .join("storage-connector-multipath.conf")
    }
}

pub fn paths(root: &Path) -> PathsConfig {
    PathsConfig {
        iscsi_dir: root.join("etc/iscsi"),
        multipath_dir: root.join("etc/multipath"),
        scsi_host_dir: root.join("sys/class/scsi_host"),
        state_dir: root.join("var/lib/storage-connector"),
        policy_dir: root.join("etc/policy-rc.d"),
        systemd_run_dir: root.join("run/systemd/system"),
        container_marker: root.join("run/container_type"),
    }
}

/// Serve `body` as a plain HTTP 200 response to every connection.
pub async fn start_metrics_endpoint(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/", addr)
}
