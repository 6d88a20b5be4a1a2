//! Static CRD templates and controller configuration fragments

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// CRD manifest file inside the resources directory
pub const CRDS_FILE: &str = "crds.yaml";

/// Directory of JSON configuration fragments inside the resources directory
pub const CONFIG_DIR: &str = "config";

/// Conversion strategy that routes through the webhook server
pub const WEBHOOK_CONVERSION: &str = "Webhook";

/// CRD templates and configuration fragments, loaded once and rendered many times
#[derive(Clone, Debug, PartialEq)]
pub struct StaticResources {
    /// CRDs in manifest order
    pub crds: Vec<CustomResourceDefinition>,

    /// Configuration fragments keyed by file stem, content verbatim
    pub config_fragments: BTreeMap<String, String>,
}

impl StaticResources {
    /// Load `crds.yaml` and `config/*.json` from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let crds_path = dir.join(CRDS_FILE);
        let crds_yaml = fs::read_to_string(&crds_path).map_err(|e| {
            Error::TemplateError(format!("Failed to read {}: {}", crds_path.display(), e))
        })?;

        let fragments = load_config_fragments(&dir.join(CONFIG_DIR))?;

        Self::from_parts(&crds_yaml, fragments)
    }

    /// Build from an in-memory CRD manifest and fragments
    pub fn from_parts(crds_yaml: &str, config_fragments: BTreeMap<String, String>) -> Result<Self> {
        let crds = parse_crds(crds_yaml)?;

        if !crds.iter().any(has_webhook_conversion) {
            return Err(Error::TemplateError(
                "no CRD declares a Webhook conversion strategy".to_string(),
            ));
        }

        Ok(Self {
            crds,
            config_fragments,
        })
    }
}

/// Parse a multi-document CRD manifest, skipping empty documents
pub fn parse_crds(yaml: &str) -> Result<Vec<CustomResourceDefinition>> {
    let mut crds = Vec::new();

    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::TemplateError(format!("Invalid CRD manifest: {}", e)))?;
        if value.is_null() {
            continue;
        }

        let crd: CustomResourceDefinition = serde_yaml::from_value(value)
            .map_err(|e| Error::TemplateError(format!("Invalid CRD: {}", e)))?;
        if crd.metadata.name.is_none() {
            return Err(Error::TemplateError("CRD without metadata.name".to_string()));
        }

        debug!(name = crd.metadata.name.as_deref(), "Loaded CRD template");
        crds.push(crd);
    }

    Ok(crds)
}

/// Whether the CRD converts between versions through a webhook
pub fn has_webhook_conversion(crd: &CustomResourceDefinition) -> bool {
    crd.spec
        .conversion
        .as_ref()
        .map(|c| c.strategy == WEBHOOK_CONVERSION)
        .unwrap_or(false)
}

fn load_config_fragments(dir: &Path) -> Result<BTreeMap<String, String>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::TemplateError(format!("Failed to read {}: {}", dir.display(), e))
    })?;

    let mut fragments = BTreeMap::new();
    for entry in entries {
        let path = entry
            .map_err(|e| Error::TemplateError(format!("Failed to list {}: {}", dir.display(), e)))?
            .path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let key = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                Error::TemplateError(format!("Unusable file name {}", path.display()))
            })?
            .to_string();
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::TemplateError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        fragments.insert(key, content);
    }

    Ok(fragments)
}
