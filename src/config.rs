//! Operator configuration
//!
//! Values come from an optional config file named by `KFSERVING_OPERATOR_CONFIG`,
//! overridden by environment variables prefixed with `KFSERVING_OPERATOR_`
//! (for example `KFSERVING_OPERATOR_WEBHOOK_PORT=9443`).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "KFSERVING_OPERATOR";

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "KFSERVING_OPERATOR_CONFIG";

/// Configuration for the operator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Application name, used for resource names and certificate SANs
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Namespace the webhook server runs in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Metrics port of the managed controller
    #[serde(default = "default_metrics_port")]
    pub metrics_port: i32,

    /// Webhook port of the managed controller
    #[serde(default = "default_webhook_port")]
    pub webhook_port: i32,

    /// Directory holding `crds.yaml` and `config/*.json`
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,

    /// OCI image resource file (`registrypath`, `username`, `password`)
    #[serde(default = "default_image_resource")]
    pub image_resource: PathBuf,

    /// Durable state directory for this operator instance
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Port for the operator's own metrics and health endpoints
    #[serde(default = "default_operator_metrics_port")]
    pub operator_metrics_port: u16,

    /// Interval between config-changed resyncs
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Whether to hold a Lease before driving cluster state
    #[serde(default = "default_leader_election")]
    pub leader_election: bool,

    /// Holder identity used for leader election
    #[serde(default = "default_identity")]
    pub identity: String,
}

fn default_app_name() -> String {
    "kfserving".to_string()
}

fn default_namespace() -> String {
    std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

fn default_metrics_port() -> i32 {
    8080
}

fn default_webhook_port() -> i32 {
    9443
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("resources")
}

fn default_image_resource() -> PathBuf {
    PathBuf::from("/var/run/kfserving-operator/oci-image.yaml")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/kfserving-operator")
}

fn default_operator_metrics_port() -> u16 {
    9090
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_leader_election() -> bool {
    true
}

fn default_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "kfserving-operator".to_string())
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            namespace: default_namespace(),
            metrics_port: default_metrics_port(),
            webhook_port: default_webhook_port(),
            resources_dir: default_resources_dir(),
            image_resource: default_image_resource(),
            state_dir: default_state_dir(),
            operator_metrics_port: default_operator_metrics_port(),
            resync_interval_secs: default_resync_interval_secs(),
            leader_election: default_leader_election(),
            identity: default_identity(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build config: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Identity of the managed application
    pub fn identity(&self) -> Identity {
        Identity {
            namespace: self.namespace.clone(),
            app_name: self.app_name.clone(),
        }
    }

    /// Port settings for the managed controller
    pub fn ports(&self) -> PortConfig {
        PortConfig {
            metrics_port: self.metrics_port,
            webhook_port: self.webhook_port,
        }
    }

    /// Resync period, at least one second
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }
}

/// Namespace and application name of the managed webhook server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub namespace: String,
    pub app_name: String,
}

impl Identity {
    pub fn new(namespace: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            app_name: app_name.into(),
        }
    }
}

/// `metrics-port` and `webhook-port` of the managed controller
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub metrics_port: i32,
    pub webhook_port: i32,
}

impl PortConfig {
    /// Reject ports outside 1..=65535 and a metrics port equal to the webhook port
    pub fn validate(&self) -> Result<()> {
        for (name, port) in [
            ("metrics-port", self.metrics_port),
            ("webhook-port", self.webhook_port),
        ] {
            if !(1..=65535).contains(&port) {
                return Err(Error::ValidationError(format!(
                    "{} must be between 1 and 65535, got {}",
                    name, port
                )));
            }
        }

        if self.metrics_port == self.webhook_port {
            return Err(Error::ValidationError(format!(
                "metrics-port and webhook-port must differ, both are {}",
                self.metrics_port
            )));
        }

        Ok(())
    }
}
