//! `iscsid.conf` rendering.

use std::fmt::Write;

use crate::config::ConnectorConfig;

const HEADER: &str = "# Managed by storage-connector. Local changes will be overwritten.\n";

/// Render the daemon settings as ordered `key = value` lines.
///
/// Authentication settings are emitted only when configured.
pub fn render(config: &ConnectorConfig) -> String {
    let mut out = String::from(HEADER);
    let mut line = |key: &str, value: &str| {
        let _ = writeln!(out, "{} = {}", key, value);
    };

    line("node.startup", &config.iscsi_node_startup);
    line(
        "node.session.iscsi.FastAbort",
        &config.iscsi_node_session_iscsi_fastabort,
    );
    line("node.session.scan", &config.iscsi_node_session_scan);

    let auth = [
        ("node.session.auth.authmethod", &config.iscsi_node_session_auth_authmethod),
        ("node.session.auth.username", &config.iscsi_node_session_auth_username),
        ("node.session.auth.password", &config.iscsi_node_session_auth_password),
        ("node.session.auth.username_in", &config.iscsi_node_session_auth_username_in),
        ("node.session.auth.password_in", &config.iscsi_node_session_auth_password_in),
    ];
    for (key, value) in auth {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            line(key, value);
        }
    }
    out
}
