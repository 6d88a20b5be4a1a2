//! Applying a rendered desired state to the cluster

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::future::Future;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::desired_state::DesiredState;
use crate::adapters::{build_labels, config_map_builder, rbac_builder, workload_builder, MANAGER};
use crate::{Error, Result};

/// Primitive that makes the cluster match a desired state
///
/// One call per reconciliation; the state replaces whatever was applied before.
pub trait StateApplier {
    fn apply(&self, state: &DesiredState) -> impl Future<Output = Result<()>> + Send;
}

/// Server-side applies every object of the desired state
#[derive(Clone)]
pub struct KubeApplier {
    client: Client,
    app_name: String,
    namespace: String,
}

impl KubeApplier {
    pub fn new(client: Client, app_name: &str, namespace: &str) -> Self {
        Self {
            client,
            app_name: app_name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn patch_params() -> PatchParams {
        PatchParams::apply(MANAGER).force()
    }

    async fn apply_cluster<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let kind = K::kind(&Default::default()).to_string();
        let name = object_name(obj, &kind)?;
        let api: Api<K> = Api::all(self.client.clone());

        api.patch(&name, &Self::patch_params(), &Patch::Apply(obj))
            .await
            .map_err(|e| Error::KubeError(format!("Failed to apply {} {}: {}", kind, name, e)))?;

        debug!("Applied {} {}", kind, name);
        Ok(())
    }

    async fn apply_namespaced<K>(&self, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let kind = K::kind(&Default::default()).to_string();
        let name = object_name(obj, &kind)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.namespace);

        api.patch(&name, &Self::patch_params(), &Patch::Apply(obj))
            .await
            .map_err(|e| {
                Error::KubeError(format!(
                    "Failed to apply {} {}/{}: {}",
                    kind, self.namespace, name, e
                ))
            })?;

        debug!("Applied {} {}/{}", kind, self.namespace, name);
        Ok(())
    }

    async fn prune_cluster<K>(&self, keep: BTreeSet<String>) -> Result<()>
    where
        K: Resource + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        self.prune(Api::<K>::all(self.client.clone()), keep).await
    }

    async fn prune_namespaced<K>(&self, keep: BTreeSet<String>) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        self.prune(Api::<K>::namespaced(self.client.clone(), &self.namespace), keep)
            .await
    }

    /// Delete objects this operator labelled for the app that are no longer desired
    async fn prune<K>(&self, api: Api<K>, keep: BTreeSet<String>) -> Result<()>
    where
        K: Resource + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let kind = K::kind(&Default::default()).to_string();
        let selector = managed_selector(&self.app_name);
        let existing = api
            .list_metadata(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::KubeError(format!("Failed to list {}: {}", kind, e)))?;

        let names: Vec<String> = existing
            .items
            .into_iter()
            .filter_map(|obj| obj.metadata.name)
            .collect();

        for name in stale_names(names.iter().map(String::as_str), &keep) {
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => info!("Deleted stale {} {}", kind, name),
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    debug!("{} {} already gone", kind, name)
                }
                Err(e) => {
                    return Err(Error::KubeError(format!(
                        "Failed to delete {} {}: {}",
                        kind, name, e
                    )))
                }
            }
        }
        Ok(())
    }
}

impl StateApplier for KubeApplier {
    async fn apply(&self, state: &DesiredState) -> Result<()> {
        let manifests = Manifests::build(state, &self.app_name, &self.namespace);

        for crd in &manifests.custom_resource_definitions {
            self.apply_cluster(crd).await?;
        }

        self.apply_namespaced(&manifests.service_account).await?;
        self.apply_cluster(&manifests.cluster_role).await?;
        self.apply_cluster(&manifests.cluster_role_binding).await?;

        for secret in &manifests.secrets {
            self.apply_namespaced(secret).await?;
        }
        for config_map in &manifests.config_maps {
            self.apply_namespaced(config_map).await?;
        }
        for service in &manifests.services {
            self.apply_namespaced(service).await?;
        }
        self.apply_namespaced(&manifests.deployment).await?;

        for config in &manifests.mutating_webhook_configurations {
            self.apply_cluster(config).await?;
        }
        for config in &manifests.validating_webhook_configurations {
            self.apply_cluster(config).await?;
        }

        // CRDs are left in place
        self.prune_namespaced::<ServiceAccount>(names_of([&manifests.service_account]))
            .await?;
        self.prune_cluster::<ClusterRole>(names_of([&manifests.cluster_role]))
            .await?;
        self.prune_cluster::<ClusterRoleBinding>(names_of([&manifests.cluster_role_binding]))
            .await?;
        self.prune_namespaced::<Secret>(names_of(&manifests.secrets))
            .await?;
        self.prune_namespaced::<ConfigMap>(names_of(&manifests.config_maps))
            .await?;
        self.prune_namespaced::<Service>(names_of(&manifests.services))
            .await?;
        self.prune_namespaced::<Deployment>(names_of([&manifests.deployment]))
            .await?;
        self.prune_cluster::<MutatingWebhookConfiguration>(names_of(
            &manifests.mutating_webhook_configurations,
        ))
        .await?;
        self.prune_cluster::<ValidatingWebhookConfiguration>(names_of(
            &manifests.validating_webhook_configurations,
        ))
        .await?;

        info!(
            "Applied desired state for {}/{}: {} CRDs, {} webhooks",
            self.namespace,
            self.app_name,
            manifests.custom_resource_definitions.len(),
            state.webhook_count()
        );
        Ok(())
    }
}

/// Every Kubernetes object a desired state materialises as, in apply order
#[derive(Debug, Clone)]
pub struct Manifests {
    pub custom_resource_definitions: Vec<CustomResourceDefinition>,
    pub service_account: ServiceAccount,
    pub cluster_role: ClusterRole,
    pub cluster_role_binding: ClusterRoleBinding,
    /// File-volume secrets, then the image pull secret when credentials are set
    pub secrets: Vec<Secret>,
    pub config_maps: Vec<ConfigMap>,
    pub services: Vec<Service>,
    pub deployment: Deployment,
    pub mutating_webhook_configurations: Vec<MutatingWebhookConfiguration>,
    pub validating_webhook_configurations: Vec<ValidatingWebhookConfiguration>,
}

impl Manifests {
    pub fn build(state: &DesiredState, app_name: &str, namespace: &str) -> Self {
        let mut secrets: Vec<Secret> = state
            .workload
            .file_volumes
            .iter()
            .map(|v| workload_builder::build_file_volume_secret(app_name, namespace, v))
            .collect();
        secrets.extend(workload_builder::build_image_pull_secret(
            app_name,
            namespace,
            &state.workload.image_details,
        ));

        let config_maps = state
            .config_maps
            .iter()
            .map(|(name, data)| config_map_builder::build_config_map(app_name, namespace, name, data))
            .collect();

        let mut manifests = Self {
            custom_resource_definitions: state.custom_resource_definitions.clone(),
            service_account: rbac_builder::build_service_account(app_name, namespace),
            cluster_role: rbac_builder::build_cluster_role(app_name, &state.rbac_rules),
            cluster_role_binding: rbac_builder::build_cluster_role_binding(app_name, namespace),
            secrets,
            config_maps,
            services: state.services.clone(),
            deployment: workload_builder::build_deployment(
                app_name,
                namespace,
                &state.workload,
                &calculate_workload_hash(state),
            ),
            mutating_webhook_configurations: state.mutating_webhook_configurations.clone(),
            validating_webhook_configurations: state.validating_webhook_configurations.clone(),
        };
        manifests.label_all(&build_labels(app_name));
        manifests
    }

    /// Stamp the ownership labels on every object so stale ones can be found later
    fn label_all(&mut self, labels: &BTreeMap<String, String>) {
        for crd in &mut self.custom_resource_definitions {
            add_labels(crd, labels);
        }
        add_labels(&mut self.service_account, labels);
        add_labels(&mut self.cluster_role, labels);
        add_labels(&mut self.cluster_role_binding, labels);
        for secret in &mut self.secrets {
            add_labels(secret, labels);
        }
        for config_map in &mut self.config_maps {
            add_labels(config_map, labels);
        }
        for service in &mut self.services {
            add_labels(service, labels);
        }
        add_labels(&mut self.deployment, labels);
        for config in &mut self.mutating_webhook_configurations {
            add_labels(config, labels);
        }
        for config in &mut self.validating_webhook_configurations {
            add_labels(config, labels);
        }
    }

    /// Multi-document YAML of all objects, in apply order
    pub fn to_yaml(&self) -> Result<String> {
        let mut docs = Vec::new();
        for crd in &self.custom_resource_definitions {
            docs.push(to_yaml_doc(crd)?);
        }
        docs.push(to_yaml_doc(&self.service_account)?);
        docs.push(to_yaml_doc(&self.cluster_role)?);
        docs.push(to_yaml_doc(&self.cluster_role_binding)?);
        for secret in &self.secrets {
            docs.push(to_yaml_doc(secret)?);
        }
        for config_map in &self.config_maps {
            docs.push(to_yaml_doc(config_map)?);
        }
        for service in &self.services {
            docs.push(to_yaml_doc(service)?);
        }
        docs.push(to_yaml_doc(&self.deployment)?);
        for config in &self.mutating_webhook_configurations {
            docs.push(to_yaml_doc(config)?);
        }
        for config in &self.validating_webhook_configurations {
            docs.push(to_yaml_doc(config)?);
        }

        Ok(docs
            .into_iter()
            .map(|doc| format!("---\n{}", doc))
            .collect())
    }
}

fn to_yaml_doc<T: Serialize>(obj: &T) -> Result<String> {
    serde_yaml::to_string(obj)
        .map_err(|e| Error::TemplateError(format!("Failed to serialize manifest: {}", e)))
}

fn add_labels<K: Resource>(obj: &mut K, labels: &BTreeMap<String, String>) {
    obj.meta_mut()
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels.clone());
}

/// Label selector matching every object the operator manages for `app_name`
pub fn managed_selector(app_name: &str) -> String {
    format!(
        "app.kubernetes.io/name={},app.kubernetes.io/managed-by={}",
        app_name, MANAGER
    )
}

/// Names of the given objects; unnamed objects are skipped
pub fn names_of<'a, K: Resource + 'a>(objs: impl IntoIterator<Item = &'a K>) -> BTreeSet<String> {
    objs.into_iter()
        .filter_map(|obj| obj.meta().name.clone())
        .collect()
}

/// Existing names that are not desired, in their listed order
pub fn stale_names<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    desired: &BTreeSet<String>,
) -> Vec<String> {
    existing
        .into_iter()
        .filter(|name| !desired.contains(*name))
        .map(str::to_string)
        .collect()
}

fn object_name<K: Resource>(obj: &K, kind: &str) -> Result<String> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| Error::ValidationError(format!("{} without metadata.name", kind)))
}

/// Hash of the mounted files and config so pods roll when either changes
pub fn calculate_workload_hash(state: &DesiredState) -> String {
    let mut hasher = Sha256::new();
    let volumes = serde_json::to_string(&state.workload.file_volumes).unwrap_or_default();
    let config_maps = serde_json::to_string(&state.config_maps).unwrap_or_default();
    hasher.update(volumes.as_bytes());
    hasher.update(config_maps.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}
