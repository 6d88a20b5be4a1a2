//! Observable status of the managed webhook server

use std::fmt;

use crate::adapters::oci_image::ImageError;

/// Maintenance message shown while a reconciliation is in flight
pub const SETTING_DESIRED_STATE: &str = "Setting desired state";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ControllerStatus {
    #[default]
    Active,
    Maintenance(String),
    Blocked(String),
    WaitingForResource(String),
}

impl ControllerStatus {
    /// Label used for the status gauge
    pub fn label(&self) -> &'static str {
        match self {
            ControllerStatus::Active => "active",
            ControllerStatus::Maintenance(_) => "maintenance",
            ControllerStatus::Blocked(_) => "blocked",
            ControllerStatus::WaitingForResource(_) => "waiting",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ControllerStatus::Active => "",
            ControllerStatus::Maintenance(m)
            | ControllerStatus::Blocked(m)
            | ControllerStatus::WaitingForResource(m) => m,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ControllerStatus::Active)
    }
}

impl From<&ImageError> for ControllerStatus {
    fn from(err: &ImageError) -> Self {
        match err {
            ImageError::ResourceUnavailable(m) => ControllerStatus::WaitingForResource(m.clone()),
            ImageError::ResourceError(m) => ControllerStatus::Blocked(m.clone()),
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerStatus::Active => write!(f, "Active"),
            ControllerStatus::Maintenance(m) => write!(f, "Maintenance: {}", m),
            ControllerStatus::Blocked(m) => write!(f, "Blocked: {}", m),
            ControllerStatus::WaitingForResource(m) => write!(f, "WaitingForResource: {}", m),
        }
    }
}
