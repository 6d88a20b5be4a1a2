//! OCI image resource resolution
//!
//! The image to run is supplied as a small YAML resource file:
//!
//! ```yaml
//! registrypath: docker.io/kfserving/kfserving-controller:v0.5.1
//! username: ""
//! password: ""
//! ```

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message reported while the image resource has not been attached yet
pub const WAITING_FOR_IMAGE: &str = "waiting for oci-image resource";

/// Resolved, pullable image
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub image_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ImageDescriptor {
    /// Image without registry credentials
    pub fn public(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            username: None,
            password: None,
        }
    }

    /// Registry credentials, when both username and password are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl fmt::Debug for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageDescriptor")
            .field("image_path", &self.image_path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why an image could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Not resolvable yet; reported as waiting
    #[error("{0}")]
    ResourceUnavailable(String),

    /// Resource present but unusable; reported as blocked
    #[error("{0}")]
    ResourceError(String),
}

/// Turns an image reference into a pullable descriptor
pub trait ImageResolver {
    fn fetch(&self) -> Result<ImageDescriptor, ImageError>;
}

/// Image resource read from a YAML file
#[derive(Debug, Clone)]
pub struct OciImageResource {
    path: PathBuf,
}

#[derive(Deserialize)]
struct OciImageRecord {
    registrypath: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl OciImageResource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ImageResolver for OciImageResource {
    fn fetch(&self) -> Result<ImageDescriptor, ImageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ImageError::ResourceUnavailable(WAITING_FOR_IMAGE.to_string()))
            }
            Err(e) => {
                return Err(ImageError::ResourceError(format!(
                    "failed to read oci-image resource: {}",
                    e
                )))
            }
        };

        if text.trim().is_empty() {
            return Err(ImageError::ResourceUnavailable(WAITING_FOR_IMAGE.to_string()));
        }

        let record: OciImageRecord = serde_yaml::from_str(&text)
            .map_err(|e| ImageError::ResourceError(format!("invalid oci-image resource: {}", e)))?;

        if record.registrypath.trim().is_empty() {
            return Err(ImageError::ResourceError(
                "invalid oci-image resource: registrypath is empty".to_string(),
            ));
        }

        Ok(ImageDescriptor {
            image_path: record.registrypath,
            username: record.username,
            password: record.password,
        })
    }
}

/// Resolver that always returns the same descriptor
#[derive(Debug, Clone)]
pub struct StaticImage(pub ImageDescriptor);

impl ImageResolver for StaticImage {
    fn fetch(&self) -> Result<ImageDescriptor, ImageError> {
        Ok(self.0.clone())
    }
}
