//! CRDs with their conversion webhook wired to the operator's CA

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, ServiceReference, WebhookClientConfig, WebhookConversion,
};

use super::webhook_builder::{WebhookTarget, WEBHOOK_SERVICE_PORT};
use crate::crd::{has_webhook_conversion, StaticResources};

/// Path the webhook server handles conversion reviews on
pub const CONVERSION_PATH: &str = "/convert";

const CONVERSION_REVIEW_VERSIONS: &[&str] = &["v1beta1"];

/// All CRD templates, with conversion webhooks pointed at `target`
pub fn build_crds(
    resources: &StaticResources,
    target: &WebhookTarget,
) -> Vec<CustomResourceDefinition> {
    resources
        .crds
        .iter()
        .map(|crd| {
            if has_webhook_conversion(crd) {
                with_conversion_webhook(crd.clone(), target)
            } else {
                crd.clone()
            }
        })
        .collect()
}

/// Inject the CA bundle and retarget the conversion service
///
/// The path and port in the template are kept when set.
pub fn with_conversion_webhook(
    mut crd: CustomResourceDefinition,
    target: &WebhookTarget,
) -> CustomResourceDefinition {
    let Some(conversion) = crd.spec.conversion.as_mut() else {
        return crd;
    };

    let webhook = conversion
        .webhook
        .get_or_insert_with(|| WebhookConversion {
            client_config: None,
            conversion_review_versions: CONVERSION_REVIEW_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
        });
    let client_config = webhook
        .client_config
        .get_or_insert_with(WebhookClientConfig::default);

    client_config.ca_bundle = Some(target.ca_bundle.clone());
    client_config.url = None;

    let service = client_config
        .service
        .get_or_insert_with(ServiceReference::default);
    service.name = target.service_name.clone();
    service.namespace = target.namespace.clone();
    if service.path.is_none() {
        service.path = Some(CONVERSION_PATH.to_string());
    }
    if service.port.is_none() {
        service.port = Some(WEBHOOK_SERVICE_PORT);
    }

    crd
}
