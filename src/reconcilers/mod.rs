//! Rendering and applying the desired cluster state

pub mod apply;
pub mod desired_state;

pub use apply::{KubeApplier, StateApplier};
pub use desired_state::{render, DesiredState, ReconciliationInput};
