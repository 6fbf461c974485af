//! PrometheusRule CRD
//!
//! Recording and alerting rules loaded by Prometheus instances whose
//! `ruleSelector` matches the object's labels.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "PrometheusRule",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusRuleSpec {
    /// Rule groups, evaluated independently
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// A named group of rules evaluated at a common interval
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    /// Group name, unique within the object
    pub name: String,

    /// Evaluation interval (e.g. "30s"); Prometheus' global default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Limit on series/alerts a rule may produce; 0 means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A single recording or alerting rule
///
/// Exactly one of `record` / `alert` is expected to be set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Name of the time series to record into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,

    /// Name of the alert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    /// PromQL expression
    pub expr: String,

    /// How long the expression must hold before an alert fires
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Rule {
    /// True for alerting rules
    pub fn is_alert(&self) -> bool {
        self.alert.is_some()
    }
}

impl PrometheusRuleSpec {
    /// Finds a group by name
    pub fn group(&self, name: &str) -> Option<&RuleGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Total number of rules across all groups
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    const RULE_YAML: &str = r#"
apiVersion: monitoring.coreos.com/v1
kind: PrometheusRule
metadata:
  name: api-alerts
  namespace: monitoring
spec:
  groups:
    - name: api.rules
      interval: 30s
      rules:
        - record: job:http_requests:rate5m
          expr: sum by (job) (rate(http_requests_total[5m]))
        - alert: HighErrorRate
          expr: job:http_errors:rate5m > 0.05
          for: 10m
          labels:
            severity: page
"#;

    #[test]
    fn test_prometheus_rule_deserializes_from_manifest() {
        let rule: PrometheusRule = serde_yaml::from_str(RULE_YAML).unwrap();

        assert_eq!(rule.metadata.name.as_deref(), Some("api-alerts"));
        assert_eq!(rule.spec.rule_count(), 2);

        let group = rule.spec.group("api.rules").unwrap();
        assert_eq!(group.interval.as_deref(), Some("30s"));
        assert!(!group.rules[0].is_alert());
        assert!(group.rules[1].is_alert());
        assert_eq!(group.rules[1].for_duration.as_deref(), Some("10m"));
        assert_eq!(group.rules[1].labels.get("severity").map(String::as_str), Some("page"));
    }

    #[test]
    fn test_prometheus_rule_resource_metadata() {
        assert_eq!(PrometheusRule::group(&()), crate::MONITORING_GROUP);
        assert_eq!(PrometheusRule::kind(&()), "PrometheusRule");
        assert_eq!(PrometheusRule::plural(&()), "prometheusrules");
    }

    #[test]
    fn test_for_field_serializes_with_reserved_name() {
        let rule = Rule {
            alert: Some("Down".to_string()),
            expr: "up == 0".to_string(),
            for_duration: Some("5m".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["for"], "5m");
        assert!(json.get("record").is_none());
    }
}
