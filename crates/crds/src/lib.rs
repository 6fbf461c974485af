//! Monitoring CRD Definitions
//!
//! Typed Kubernetes custom resources from the `monitoring.coreos.com/v1` API group,
//! as served by the Prometheus Operator. The cluster client exposes them alongside
//! the built-in kinds so rule objects can be read, written and watched the same way.

pub mod selector;
pub mod prometheus;
pub mod prometheus_rule;
pub mod service_monitor;

pub use selector::*;
pub use prometheus::*;
pub use prometheus_rule::*;
pub use service_monitor::*;

/// API group shared by every kind in this crate
pub const MONITORING_GROUP: &str = "monitoring.coreos.com";
