//! Prometheus metrics for the KFServing operator
//!
//! Reconciliation counters and timings, the controller status and this
//! instance's leadership.

pub mod prometheus;

pub use prometheus::*;
