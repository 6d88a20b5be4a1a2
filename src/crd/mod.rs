//! Custom Resource Definitions shipped with the KFServing controller

mod templates;

pub use templates::*;

/// API group of the KFServing custom resources
pub const SERVING_GROUP: &str = "serving.kubeflow.org";
