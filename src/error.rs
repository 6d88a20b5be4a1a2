//! Error types for the KFServing operator

use thiserror::Error;

use crate::adapters::oci_image::ImageError;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Certificate generation failed
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Certificate store could not be read or written
    #[error("Certificate store error: {0}")]
    StoreError(String),

    /// Static resource template is malformed
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Image resource could not be resolved
    #[error(transparent)]
    ImageError(#[from] ImageError),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Error::KubeError(err.to_string())
    }
}
