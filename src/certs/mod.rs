//! Webhook TLS material: generation and persistence
//!
//! The webhook server needs a server certificate the API server trusts. The
//! operator mints its own CA, signs a server certificate for every in-cluster
//! DNS alias of the webhook, and keeps the result for the lifetime of the
//! operator instance so repeated reconciliations never rotate it.

pub mod authority;
pub mod store;

use std::fmt;

use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};

pub use authority::generate;
pub use store::{ensure, CertificateStore, FileCertificateStore, MemoryCertificateStore};

/// CA certificate plus the server certificate and key it signed, all PEM text
///
/// Persisted as `{cert, key, ca}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    #[serde(rename = "ca")]
    pub ca_cert: String,

    #[serde(rename = "cert")]
    pub server_cert: String,

    #[serde(rename = "key")]
    pub server_key: String,
}

impl CertificateBundle {
    /// CA certificate as a `caBundle` value; serializes as base64 of the PEM
    pub fn ca_bundle(&self) -> ByteString {
        ByteString(self.ca_cert.as_bytes().to_vec())
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("ca_cert", &self.ca_cert)
            .field("server_cert", &self.server_cert)
            .field("server_key", &"<redacted>")
            .finish()
    }
}
