//! Mutating and validating webhook configurations
//!
//! Every webhook shares one client config target: the webhook Service in the
//! operator namespace, trusted through the operator-generated CA. All of them
//! fail closed.

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use k8s_openapi::ByteString;

use crate::crd::SERVING_GROUP;

/// Port the webhook Service listens on
pub const WEBHOOK_SERVICE_PORT: i32 = 443;

/// Reject the guarded request when the webhook is unreachable
pub const FAILURE_POLICY: &str = "Fail";

pub const INFERENCE_SERVICE_CONFIGURATION: &str = "inferenceservice.serving.kubeflow.org";
pub const TRAINED_MODEL_CONFIGURATION: &str = "trainedmodel.serving.kubeflow.org";

const ADMISSION_REVIEW_VERSIONS: &[&str] = &["v1beta1"];
const SIDE_EFFECTS: &str = "None";
const OPERATIONS: &[&str] = &["CREATE", "UPDATE"];

/// (API version, webhook name) of the InferenceService defaulters
const INFERENCE_SERVICE_DEFAULTERS: &[(&str, &str)] = &[
    ("v1alpha2", "inferenceservice.kfserving-webhook-server.defaulter"),
    ("v1beta1", "inferenceservice.kfserving-webhook-server.v1beta1.defaulter"),
];

/// (API version, webhook name) of the InferenceService validators
const INFERENCE_SERVICE_VALIDATORS: &[(&str, &str)] = &[
    ("v1alpha2", "inferenceservice.kfserving-webhook-server.validator"),
    ("v1beta1", "inferenceservice.kfserving-webhook-server.v1beta1.validator"),
];

const POD_MUTATOR: &str = "inferenceservice.kfserving-webhook-server.pod-mutator";
const TRAINED_MODEL_VALIDATOR: &str = "trainedmodel.kfserving-webhook-server.validator";
const TRAINED_MODEL_VERSION: &str = "v1alpha1";

/// Service and CA every webhook call is routed through
#[derive(Clone, Debug, PartialEq)]
pub struct WebhookTarget {
    pub service_name: String,
    pub namespace: String,
    pub ca_bundle: ByteString,
}

impl WebhookTarget {
    /// Client config calling `path` on the webhook Service
    pub fn client_config(&self, path: &str) -> WebhookClientConfig {
        WebhookClientConfig {
            ca_bundle: Some(self.ca_bundle.clone()),
            service: Some(ServiceReference {
                name: self.service_name.clone(),
                namespace: self.namespace.clone(),
                path: Some(path.to_string()),
                port: Some(WEBHOOK_SERVICE_PORT),
            }),
            url: None,
        }
    }
}

/// `/mutate-serving-kubeflow-org-v1beta1-inferenceservice` style handler path
pub fn admission_path(operation: &str, group: &str, version: &str, kind: &str) -> String {
    format!(
        "/{}-{}-{}-{}",
        operation,
        group.replace('.', "-"),
        version,
        kind
    )
}

fn create_update_rule(group: &str, version: &str, resource: &str) -> RuleWithOperations {
    RuleWithOperations {
        api_groups: Some(vec![group.to_string()]),
        api_versions: Some(vec![version.to_string()]),
        operations: Some(OPERATIONS.iter().map(|o| o.to_string()).collect()),
        resources: Some(vec![resource.to_string()]),
        ..Default::default()
    }
}

fn admission_review_versions() -> Vec<String> {
    ADMISSION_REVIEW_VERSIONS.iter().map(|v| v.to_string()).collect()
}

fn selector(key: &str, operator: &str) -> LabelSelector {
    LabelSelector {
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: None,
        }]),
        match_labels: None,
    }
}

/// Defaulting webhook for one InferenceService API version
pub fn inference_service_defaulter(
    target: &WebhookTarget,
    version: &str,
    name: &str,
) -> MutatingWebhook {
    MutatingWebhook {
        name: name.to_string(),
        admission_review_versions: admission_review_versions(),
        client_config: target.client_config(&admission_path(
            "mutate",
            SERVING_GROUP,
            version,
            "inferenceservice",
        )),
        failure_policy: Some(FAILURE_POLICY.to_string()),
        side_effects: SIDE_EFFECTS.to_string(),
        rules: Some(vec![create_update_rule(
            SERVING_GROUP,
            version,
            "inferenceservices",
        )]),
        ..Default::default()
    }
}

/// Pod mutator injecting model serving sidecars
///
/// Skips namespaces labelled `control-plane` and only sees pods that belong to
/// an InferenceService.
pub fn pod_mutator(target: &WebhookTarget) -> MutatingWebhook {
    MutatingWebhook {
        name: POD_MUTATOR.to_string(),
        admission_review_versions: admission_review_versions(),
        client_config: target.client_config("/mutate-pods"),
        failure_policy: Some(FAILURE_POLICY.to_string()),
        side_effects: SIDE_EFFECTS.to_string(),
        namespace_selector: Some(selector("control-plane", "DoesNotExist")),
        object_selector: Some(selector("serving.kubeflow.org/inferenceservice", "Exists")),
        rules: Some(vec![create_update_rule("", "v1", "pods")]),
        ..Default::default()
    }
}

/// Validating webhook for one InferenceService API version
pub fn inference_service_validator(
    target: &WebhookTarget,
    version: &str,
    name: &str,
) -> ValidatingWebhook {
    ValidatingWebhook {
        name: name.to_string(),
        admission_review_versions: admission_review_versions(),
        client_config: target.client_config(&admission_path(
            "validate",
            SERVING_GROUP,
            version,
            "inferenceservice",
        )),
        failure_policy: Some(FAILURE_POLICY.to_string()),
        side_effects: SIDE_EFFECTS.to_string(),
        rules: Some(vec![create_update_rule(
            SERVING_GROUP,
            version,
            "inferenceservices",
        )]),
        ..Default::default()
    }
}

pub fn trained_model_validator(target: &WebhookTarget) -> ValidatingWebhook {
    ValidatingWebhook {
        name: TRAINED_MODEL_VALIDATOR.to_string(),
        admission_review_versions: admission_review_versions(),
        client_config: target.client_config(&admission_path(
            "validate",
            SERVING_GROUP,
            TRAINED_MODEL_VERSION,
            "trainedmodel",
        )),
        failure_policy: Some(FAILURE_POLICY.to_string()),
        side_effects: SIDE_EFFECTS.to_string(),
        rules: Some(vec![create_update_rule(
            SERVING_GROUP,
            TRAINED_MODEL_VERSION,
            "trainedmodels",
        )]),
        ..Default::default()
    }
}

/// One configuration: both InferenceService defaulters and the pod mutator
pub fn build_mutating_webhook_configurations(
    target: &WebhookTarget,
) -> Vec<MutatingWebhookConfiguration> {
    let mut webhooks: Vec<MutatingWebhook> = INFERENCE_SERVICE_DEFAULTERS
        .iter()
        .map(|(version, name)| inference_service_defaulter(target, version, name))
        .collect();
    webhooks.push(pod_mutator(target));

    vec![MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(INFERENCE_SERVICE_CONFIGURATION.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }]
}

/// InferenceService validators, then the TrainedModel validator
pub fn build_validating_webhook_configurations(
    target: &WebhookTarget,
) -> Vec<ValidatingWebhookConfiguration> {
    let inference_services = INFERENCE_SERVICE_VALIDATORS
        .iter()
        .map(|(version, name)| inference_service_validator(target, version, name))
        .collect();

    vec![
        ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(INFERENCE_SERVICE_CONFIGURATION.to_string()),
                ..Default::default()
            },
            webhooks: Some(inference_services),
        },
        ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(TRAINED_MODEL_CONFIGURATION.to_string()),
                ..Default::default()
            },
            webhooks: Some(vec![trained_model_validator(target)]),
        },
    ]
}
