//! ServiceMonitor CRD
//!
//! Declares how the endpoints of matching Services are scraped.

use crate::selector::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "ServiceMonitor",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    /// Services to scrape
    #[serde(default)]
    pub selector: LabelSelector,

    /// Namespaces to look for Services in; the object's own namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,

    /// Scrape endpoints
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Label on the Service whose value becomes the `job` label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Select all namespaces
    #[serde(default)]
    pub any: bool,

    /// Explicit namespace list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,
}

/// A scrapeable port on the selected Services
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Named Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// HTTP path, "/metrics" when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_service_monitor_deserializes_from_manifest() {
        let monitor: ServiceMonitor = serde_yaml::from_str(
            r#"
apiVersion: monitoring.coreos.com/v1
kind: ServiceMonitor
metadata:
  name: api
  namespace: monitoring
spec:
  selector:
    matchLabels:
      app: api
  namespaceSelector:
    matchNames: [prod]
  endpoints:
    - port: metrics
      interval: 15s
"#,
        )
        .unwrap();

        let labels = BTreeMap::from([("app".to_string(), "api".to_string())]);
        assert!(monitor.spec.selector.matches(&labels));
        assert_eq!(
            monitor.spec.namespace_selector.map(|ns| ns.match_names),
            Some(vec!["prod".to_string()])
        );
        assert_eq!(monitor.spec.endpoints[0].port.as_deref(), Some("metrics"));
        assert_eq!(monitor.spec.endpoints[0].path, None);
    }
}
