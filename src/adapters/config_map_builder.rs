//! ConfigMaps carrying the controller's JSON configuration fragments

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::build_labels;
use crate::crd::StaticResources;

/// ConfigMap the KFServing controller reads its runtime settings from
pub const INFERENCESERVICE_CONFIG: &str = "inferenceservice-config";

/// ConfigMap name to its entries; fragments are passed through untouched
pub fn build_config_maps(resources: &StaticResources) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut config_maps = BTreeMap::new();
    config_maps.insert(
        INFERENCESERVICE_CONFIG.to_string(),
        resources.config_fragments.clone(),
    );
    config_maps
}

/// ConfigMap object for one rendered entry set
pub fn build_config_map(
    app_name: &str,
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, String>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        data: Some(data.clone()),
        ..Default::default()
    }
}
