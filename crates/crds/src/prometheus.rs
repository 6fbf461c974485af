//! Prometheus CRD
//!
//! A Prometheus server deployment managed by the operator.

use crate::selector::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Prometheus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    /// Number of server replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Service account the server pods run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// How long samples are retained (e.g. "15d")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,

    /// Default scrape interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,

    /// PrometheusRule objects to load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_selector: Option<LabelSelector>,

    /// ServiceMonitor objects to scrape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_monitor_selector: Option<LabelSelector>,
}

impl PrometheusSpec {
    /// Whether this server would load rules carrying `labels`.
    ///
    /// Matches the operator's semantics: a missing selector selects nothing.
    pub fn selects_rules(&self, labels: &std::collections::BTreeMap<String, String>) -> bool {
        self.rule_selector
            .as_ref()
            .is_some_and(|selector| selector.matches(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_rule_selector_selects_nothing() {
        let spec = PrometheusSpec::default();
        assert!(!spec.selects_rules(&BTreeMap::new()));
    }

    #[test]
    fn test_empty_rule_selector_selects_everything() {
        let spec = PrometheusSpec {
            rule_selector: Some(LabelSelector::default()),
            ..Default::default()
        };
        let labels = BTreeMap::from([("role".to_string(), "alert-rules".to_string())]);
        assert!(spec.selects_rules(&labels));
    }
}
