//! Desired cluster state for the KFServing webhook server
//!
//! [`render`] is a pure function of its input and the static resources loaded
//! at startup: no I/O, and the same input always yields the same state.

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::rbac::v1::PolicyRule;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde::Serialize;

use crate::adapters::oci_image::ImageDescriptor;
use crate::adapters::webhook_builder::{self, WebhookTarget};
use crate::adapters::workload_builder::{self, WorkloadSpec};
use crate::adapters::{config_map_builder, crd_builder, rbac_builder, service_builder};
use crate::certs::authority::webhook_service_name;
use crate::certs::CertificateBundle;
use crate::crd::{has_webhook_conversion, StaticResources};
use crate::{Error, Result};

/// Everything a reconciliation renders from
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciliationInput {
    pub namespace: String,
    pub app_name: String,
    pub image: ImageDescriptor,
    pub metrics_port: i32,
    pub webhook_port: i32,
    pub cert_bundle: CertificateBundle,
}

/// Complete desired state, replacing whatever was applied before
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    pub workload: WorkloadSpec,
    pub rbac_rules: Vec<PolicyRule>,
    pub services: Vec<Service>,
    pub custom_resource_definitions: Vec<CustomResourceDefinition>,
    pub mutating_webhook_configurations: Vec<MutatingWebhookConfiguration>,
    pub validating_webhook_configurations: Vec<ValidatingWebhookConfiguration>,
    pub config_maps: BTreeMap<String, BTreeMap<String, String>>,
}

impl DesiredState {
    /// Number of webhooks across all mutating and validating configurations
    pub fn webhook_count(&self) -> usize {
        let mutating: usize = self
            .mutating_webhook_configurations
            .iter()
            .map(|c| c.webhooks.as_ref().map(Vec::len).unwrap_or(0))
            .sum();
        let validating: usize = self
            .validating_webhook_configurations
            .iter()
            .map(|c| c.webhooks.as_ref().map(Vec::len).unwrap_or(0))
            .sum();
        mutating + validating
    }
}

/// Render the desired state for `input`
///
/// Fails only when the static resources are unusable.
pub fn render(input: &ReconciliationInput, resources: &StaticResources) -> Result<DesiredState> {
    if !resources.crds.iter().any(has_webhook_conversion) {
        return Err(Error::TemplateError(
            "no CRD declares a Webhook conversion strategy".to_string(),
        ));
    }

    let target = WebhookTarget {
        service_name: webhook_service_name(&input.app_name),
        namespace: input.namespace.clone(),
        ca_bundle: input.cert_bundle.ca_bundle(),
    };

    Ok(DesiredState {
        workload: workload_builder::build_workload(
            &input.app_name,
            &input.namespace,
            &input.image,
            input.metrics_port,
            input.webhook_port,
            &input.cert_bundle,
        ),
        rbac_rules: rbac_builder::build_rbac_rules(),
        services: vec![service_builder::build_webhook_service(
            &input.app_name,
            &input.namespace,
            input.webhook_port,
        )],
        custom_resource_definitions: crd_builder::build_crds(resources, &target),
        mutating_webhook_configurations: webhook_builder::build_mutating_webhook_configurations(
            &target,
        ),
        validating_webhook_configurations:
            webhook_builder::build_validating_webhook_configurations(&target),
        config_maps: config_map_builder::build_config_maps(resources),
    })
}
