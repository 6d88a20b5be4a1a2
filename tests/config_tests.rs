//! Integration tests for operator configuration

use std::time::Duration;

use kfserving_operator::config::{OperatorConfig, PortConfig};
use kfserving_operator::Error;

fn ports(metrics_port: i32, webhook_port: i32) -> PortConfig {
    PortConfig {
        metrics_port,
        webhook_port,
    }
}

// ============================================================================
// Port Validation Tests
// ============================================================================

#[test]
fn default_ports_are_valid() {
    let config = OperatorConfig::default();
    assert_eq!(config.ports(), ports(8080, 9443));
    assert!(config.ports().validate().is_ok());
}

#[test]
fn out_of_range_ports_are_rejected() {
    for (metrics, webhook) in [(0, 9443), (8080, 65536), (-1, 9443)] {
        let result = ports(metrics, webhook).validate();
        assert!(
            matches!(result, Err(Error::ValidationError(_))),
            "{}/{} accepted",
            metrics,
            webhook
        );
    }
}

#[test]
fn clashing_ports_are_rejected() {
    let err = ports(9443, 9443).validate().unwrap_err();
    assert!(err.to_string().contains("must differ"));
}

// ============================================================================
// Loading Tests
// ============================================================================

#[test]
fn defaults_match_documented_values() {
    let config = OperatorConfig::default();
    assert_eq!(config.app_name, "kfserving");
    assert_eq!(config.operator_metrics_port, 9090);
    assert!(config.leader_election);
    assert_eq!(config.resync_interval(), Duration::from_secs(300));
}

#[test]
fn zero_resync_interval_is_clamped() {
    let config = OperatorConfig {
        resync_interval_secs: 0,
        ..Default::default()
    };
    assert_eq!(config.resync_interval(), Duration::from_secs(1));
}

// Only test in this binary that touches the environment
#[test]
fn file_and_environment_layers_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("operator.yaml");
    std::fs::write(
        &path,
        "app_name: models\nnamespace: serving\nwebhook_port: 9000\nleader_election: false\n",
    )
    .unwrap();

    std::env::set_var("KFSERVING_OPERATOR_CONFIG", &path);
    std::env::set_var("KFSERVING_OPERATOR_WEBHOOK_PORT", "9444");
    let loaded = OperatorConfig::load();
    std::env::remove_var("KFSERVING_OPERATOR_CONFIG");
    std::env::remove_var("KFSERVING_OPERATOR_WEBHOOK_PORT");

    let config = loaded.unwrap();
    assert_eq!(config.app_name, "models");
    assert_eq!(config.namespace, "serving");
    assert_eq!(config.webhook_port, 9444);
    assert_eq!(config.metrics_port, 8080);
    assert!(!config.leader_election);

    let identity = config.identity();
    assert_eq!(identity.app_name, "models");
    assert_eq!(identity.namespace, "serving");
}
