//! Kubernetes Service fronting the webhook server

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::build_labels;
use super::webhook_builder::WEBHOOK_SERVICE_PORT;
use crate::certs::authority::webhook_service_name;

/// Build the webhook Service: port 443 to the container's webhook port
pub fn build_webhook_service(app_name: &str, namespace: &str, webhook_port: i32) -> Service {
    let labels = build_labels(app_name);

    Service {
        metadata: ObjectMeta {
            name: Some(webhook_service_name(app_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: WEBHOOK_SERVICE_PORT,
                target_port: Some(IntOrString::Int(webhook_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-cluster endpoint of a webhook Service
pub fn get_service_endpoint(service: &Service) -> Option<String> {
    let name = service.metadata.name.as_ref()?;
    let namespace = service.metadata.namespace.as_ref()?;
    let port = service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .first()?
        .port;

    Some(format!("{}.{}.svc:{}", name, namespace, port))
}
