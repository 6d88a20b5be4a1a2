//! Workload spec for the KFServing controller manager

use std::collections::BTreeMap;
use std::fmt;

use base64::{prelude::BASE64_STANDARD, Engine};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, LocalObjectReference, PodSpec, PodTemplateSpec, Secret,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use serde::Serialize;

use super::build_labels;
use super::oci_image::ImageDescriptor;
use crate::certs::CertificateBundle;

pub const CONTAINER_NAME: &str = "manager";
pub const CERTS_VOLUME: &str = "certs";
pub const CERTS_MOUNT_PATH: &str = "/tmp/k8s-webhook-server/serving-certs";

/// Pod workload: containers plus volumes whose files are given in-line
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub containers: Vec<Container>,
    pub image_details: ImageDescriptor,
    pub file_volumes: Vec<FileVolume>,
    pub pod_labels: BTreeMap<String, String>,
}

/// Volume materialised from in-line file contents
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVolume {
    pub name: String,
    pub mount_path: String,
    pub files: Vec<VolumeFile>,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct VolumeFile {
    pub path: String,
    pub content: String,
}

impl fmt::Debug for VolumeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeFile")
            .field("path", &self.path)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .finish()
    }
}

/// Build the single-container manager workload
pub fn build_workload(
    app_name: &str,
    namespace: &str,
    image: &ImageDescriptor,
    metrics_port: i32,
    webhook_port: i32,
    certs: &CertificateBundle,
) -> WorkloadSpec {
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image.image_path.clone()),
        command: Some(vec!["/manager".to_string()]),
        args: Some(vec![format!("--metrics-addr=127.0.0.1:{}", metrics_port)]),
        ports: Some(vec![
            ContainerPort {
                name: Some("metrics".to_string()),
                container_port: metrics_port,
                ..Default::default()
            },
            ContainerPort {
                name: Some("webhook".to_string()),
                container_port: webhook_port,
                ..Default::default()
            },
        ]),
        env: Some(vec![EnvVar {
            name: "POD_NAMESPACE".to_string(),
            value: Some(namespace.to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: CERTS_VOLUME.to_string(),
            mount_path: CERTS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    WorkloadSpec {
        containers: vec![container],
        image_details: image.clone(),
        file_volumes: vec![build_certs_volume(certs)],
        pod_labels: build_labels(app_name),
    }
}

/// `tls.crt`/`tls.key` volume for the webhook server
pub fn build_certs_volume(certs: &CertificateBundle) -> FileVolume {
    FileVolume {
        name: CERTS_VOLUME.to_string(),
        mount_path: CERTS_MOUNT_PATH.to_string(),
        files: vec![
            VolumeFile {
                path: "tls.crt".to_string(),
                content: certs.server_cert.clone(),
            },
            VolumeFile {
                path: "tls.key".to_string(),
                content: certs.server_key.clone(),
            },
        ],
    }
}

/// Name of the Secret materialising a file volume
pub fn file_volume_secret_name(app_name: &str, volume: &FileVolume) -> String {
    format!("{}-{}", app_name, volume.name)
}

/// Name of the registry credentials Secret
pub fn image_pull_secret_name(app_name: &str) -> String {
    format!("{}-registry", app_name)
}

/// Secret holding the files of an in-line volume
pub fn build_file_volume_secret(app_name: &str, namespace: &str, volume: &FileVolume) -> Secret {
    let data = volume
        .files
        .iter()
        .map(|file| (file.path.clone(), ByteString(file.content.clone().into_bytes())))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(file_volume_secret_name(app_name, volume)),
            namespace: Some(namespace.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// `kubernetes.io/dockerconfigjson` Secret for images behind registry credentials
pub fn build_image_pull_secret(
    app_name: &str,
    namespace: &str,
    image: &ImageDescriptor,
) -> Option<Secret> {
    let (username, password) = image.credentials()?;
    let registry = registry_host(&image.image_path);
    let auth = BASE64_STANDARD.encode(format!("{}:{}", username, password));
    let config = serde_json::json!({
        "auths": {
            registry: {
                "username": username,
                "password": password,
                "auth": auth,
            }
        }
    });

    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        ByteString(config.to_string().into_bytes()),
    );

    Some(Secret {
        metadata: ObjectMeta {
            name: Some(image_pull_secret_name(app_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(build_labels(app_name)),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

/// Registry host of an image reference, `docker.io` when none is given
pub fn registry_host(image_path: &str) -> &str {
    match image_path.split_once('/') {
        Some((host, _)) if host.contains('.') || host.contains(':') || host == "localhost" => host,
        _ => "docker.io",
    }
}

/// Deployment running the workload under the application's service account
pub fn build_deployment(
    app_name: &str,
    namespace: &str,
    workload: &WorkloadSpec,
    checksum: &str,
) -> Deployment {
    let labels = workload.pod_labels.clone();
    let mut pod_annotations = BTreeMap::new();
    pod_annotations.insert("checksum/config".to_string(), checksum.to_string());

    let volumes = workload
        .file_volumes
        .iter()
        .map(|volume| Volume {
            name: volume.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(file_volume_secret_name(app_name, volume)),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    let image_pull_secrets = workload.image_details.credentials().map(|_| {
        vec![LocalObjectReference {
            name: image_pull_secret_name(app_name),
        }]
    });

    Deployment {
        metadata: ObjectMeta {
            name: Some(app_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: workload.containers.clone(),
                    volumes: Some(volumes),
                    service_account_name: Some(app_name.to_string()),
                    image_pull_secrets,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
