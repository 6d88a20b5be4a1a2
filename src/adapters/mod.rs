//! Builders for the Kubernetes resources that make up the desired state

pub mod config_map_builder;
pub mod crd_builder;
pub mod oci_image;
pub mod rbac_builder;
pub mod service_builder;
pub mod webhook_builder;
pub mod workload_builder;

use std::collections::BTreeMap;

/// Field manager and `managed-by` label value
pub const MANAGER: &str = "kfserving-operator";

/// Labels carried by the webhook server pods and matched by its Service
pub fn build_labels(app_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), app_name.to_string());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        "webhook-server".to_string(),
    );
    labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGER.to_string());
    labels
}
