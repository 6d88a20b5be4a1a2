//! Cluster role rules for the KFServing controller
//!
//! The rule list is the controller's exact privilege boundary. Every verb set
//! matters: a missing verb breaks the controller, an extra one widens it.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::build_labels;

const FULL: &[&str] = &["create", "delete", "get", "list", "patch", "update", "watch"];
const READ: &[&str] = &["get", "list", "watch"];
const STATUS: &[&str] = &["get", "patch", "update"];
const CONFIGMAP: &[&str] = &["create", "get", "list", "update", "watch"];

/// All rules of the controller's cluster role, in order
pub fn build_rbac_rules() -> Vec<PolicyRule> {
    let mut rules = admission_rules();
    rules.extend(core_rules());
    rules.extend(istio_rules());
    rules.extend(knative_rules());
    rules.extend(kfserving_rules());
    rules
}

/// Webhook configurations the controller keeps in sync
pub fn admission_rules() -> Vec<PolicyRule> {
    vec![rule(
        "admissionregistration.k8s.io",
        &[
            "mutatingwebhookconfigurations",
            "validatingwebhookconfigurations",
        ],
        FULL,
    )]
}

pub fn core_rules() -> Vec<PolicyRule> {
    vec![
        rule("", &["configmaps"], CONFIGMAP),
        rule("", &["events"], FULL),
        rule("", &["namespaces"], READ),
        rule("", &["secrets"], FULL),
        rule("", &["serviceaccounts"], READ),
        rule("", &["services"], FULL),
    ]
}

pub fn istio_rules() -> Vec<PolicyRule> {
    vec![
        rule("networking.istio.io", &["virtualservices"], FULL),
        rule("networking.istio.io", &["virtualservices/finalizers"], FULL),
        rule("networking.istio.io", &["virtualservices/status"], STATUS),
    ]
}

pub fn knative_rules() -> Vec<PolicyRule> {
    vec![
        rule("serving.knative.dev", &["services"], FULL),
        rule("serving.knative.dev", &["services/finalizers"], FULL),
        rule("serving.knative.dev", &["services/status"], STATUS),
    ]
}

/// The controller's own custom resources
pub fn kfserving_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "serving.kubeflow.org",
            &["inferenceservices", "inferenceservices/finalizers"],
            FULL,
        ),
        rule("serving.kubeflow.org", &["inferenceservices/status"], STATUS),
        rule("serving.kubeflow.org", &["trainedmodels"], FULL),
        rule("serving.kubeflow.org", &["trainedmodels/status"], STATUS),
    ]
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

/// Service account the controller manager runs as
pub fn build_service_account(app_name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(app_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cluster role carrying `rules`
pub fn build_cluster_role(app_name: &str, rules: &[PolicyRule]) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(app_name.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        rules: Some(rules.to_vec()),
        ..Default::default()
    }
}

/// Binds the cluster role to the controller's service account
pub fn build_cluster_role_binding(app_name: &str, namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(app_name.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: app_name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: app_name.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}
