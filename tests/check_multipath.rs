//! Path-count check against a live metrics endpoint.

use storage_connector::observability::check::{check_multipath, NagiosStatus};

mod common;

const BODY: &str = "\
# TYPE iscsi_multipath_path_total gauge
iscsi_multipath_path_total{alias=\"data1\",wwid=\"360014380056efd060000d00000510000\"} 4
iscsi_multipath_path_total{alias=\"mpatha\",wwid=\"3600a098038303634722b4d59614f4b6f\"} 2
";

#[tokio::test]
async fn test_matching_paths_are_ok() {
    let url = common::start_metrics_endpoint(
        "iscsi_multipath_path_total{alias=\"data1\",wwid=\"3600\"} 4\n".to_string(),
    )
    .await;

    let result = check_multipath(&url, 4).await;

    assert_eq!(result.status, NagiosStatus::Ok);
    assert_eq!(result.to_string(), "OK: Correct number of paths found.");
}

#[tokio::test]
async fn test_mismatch_is_critical() {
    let url = common::start_metrics_endpoint(BODY.to_string()).await;

    let result = check_multipath(&url, 4).await;

    assert_eq!(result.status, NagiosStatus::Critical);
    assert_eq!(result.status.exit_code(), 2);
    assert_eq!(result.message, "Expected 4 paths for mpatha but found 2.");
}

#[tokio::test]
async fn test_missing_metric_is_critical() {
    let url = common::start_metrics_endpoint("storage_connector_deferred_restarts 0\n".to_string()).await;

    let result = check_multipath(&url, 4).await;

    assert_eq!(result.status, NagiosStatus::Critical);
    assert_eq!(result.message, "Metric: iscsi_multipath_path_total not found");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_critical() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = check_multipath(&format!("http://{}/", addr), 4).await;

    assert_eq!(result.status, NagiosStatus::Critical);
    assert!(result.message.starts_with("Cannot scrape metrics"));
}
