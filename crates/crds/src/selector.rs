//! Label selectors used by the monitoring kinds
//!
//! Mirrors the Kubernetes `LabelSelector` shape. A local type keeps the CRD
//! schemas independent of k8s-openapi's optional schemars support.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects objects by label
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact label matches (ANDed)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements (ANDed)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based selector requirement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`
    pub operator: String,

    /// Values for `In` / `NotIn`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelector {
    /// Returns true if `labels` satisfies every requirement of this selector.
    ///
    /// An empty selector matches everything. Unknown operators never match.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));

        labels_match
            && self.match_expressions.iter().all(|req| {
                let value = labels.get(&req.key);
                match req.operator.as_str() {
                    "In" => value.is_some_and(|v| req.values.contains(v)),
                    "NotIn" => value.is_none_or(|v| !req.values.contains(v)),
                    "Exists" => value.is_some(),
                    "DoesNotExist" => value.is_none(),
                    _ => false,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        assert!(LabelSelector::default().matches(&labels(&[])));
        assert!(LabelSelector::default().matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn test_match_labels_and_expressions() {
        let selector = LabelSelector {
            match_labels: labels(&[("role", "alert-rules")]),
            match_expressions: vec![LabelSelectorRequirement {
                key: "team".to_string(),
                operator: "In".to_string(),
                values: vec!["infra".to_string(), "sre".to_string()],
            }],
        };

        assert!(selector.matches(&labels(&[("role", "alert-rules"), ("team", "sre")])));
        assert!(!selector.matches(&labels(&[("role", "alert-rules"), ("team", "web")])));
        assert!(!selector.matches(&labels(&[("team", "sre")])));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let selector = LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "team".to_string(),
                operator: "Gt".to_string(),
                values: vec![],
            }],
        };
        assert!(!selector.matches(&labels(&[("team", "sre")])));
    }
}
