//! Event-driven reconciliation of the webhook server

pub mod driver;
pub mod events;
pub mod leader;
pub mod status;

pub use driver::{Driver, EventKind, Handler, Trigger};
pub use events::run_events;
pub use leader::{lease_name, LeaderElector, LeaderFlag};
pub use status::ControllerStatus;
