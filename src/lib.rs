//! KFServing Webhook Lifecycle Operator
//!
//! Keeps the KFServing admission webhook server deployed: generates and
//! persists its serving certificates, renders the controller workload, RBAC,
//! CRDs and webhook configurations, and applies them to the cluster.

pub mod adapters;
pub mod certs;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;

pub use error::{Error, Result};
