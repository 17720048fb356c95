//! Keyword heuristics that bucket failures by area.
//!
//! Categories are a triage hint, not ground truth.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Area a failing test most likely belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Network,
    Storage,
    Migration,
    Compute,
    Operator,
    Infrastructure,
    InfraTimeout,
    InfraError,
    General,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Migration => "migration",
            Self::Compute => "compute",
            Self::Operator => "operator",
            Self::Infrastructure => "infrastructure",
            Self::InfraTimeout => "infra-timeout",
            Self::InfraError => "infra-error",
            Self::General => "general",
        }
    }

    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            Self::Infrastructure | Self::InfraTimeout | Self::InfraError
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const KEYWORDS: &[(FailureCategory, &[&str])] = &[
    (
        FailureCategory::Network,
        &["network", "bridge", "masquerade", "sriov"],
    ),
    (FailureCategory::Storage, &["storage", "volume", "disk", "pvc"]),
    (FailureCategory::Migration, &["migration", "migrate"]),
    (
        FailureCategory::Compute,
        &["compute", "cpu", "memory", "lifecycle"],
    ),
    (FailureCategory::Operator, &["operator"]),
];

/// Categorize a test name. First matching keyword set wins.
pub fn categorize(test_name: &str) -> FailureCategory {
    let name = test_name.to_lowercase();

    if name.contains("infrastructure failure") {
        return if name.contains("aborted") {
            FailureCategory::InfraTimeout
        } else if name.contains("error") {
            FailureCategory::InfraError
        } else {
            FailureCategory::Infrastructure
        };
    }

    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| name.contains(w)))
        .map_or(FailureCategory::General, |(category, _)| *category)
}

/// Likely causes suggested by the test name.
pub fn potential_causes(test_name: &str) -> Vec<&'static str> {
    const HINTS: &[(&[&str], &[&str])] = &[
        (
            &["timeout"],
            &["timeout", "resource_contention", "slow_operations"],
        ),
        (
            &["migration"],
            &["migration_timeout", "network_issues", "resource_shortage"],
        ),
        (
            &["connection", "network"],
            &["network_connectivity", "dns_issues", "firewall_rules"],
        ),
        (
            &["memory", "oom"],
            &["memory_pressure", "resource_limits", "memory_leak"],
        ),
        (
            &["disk", "storage"],
            &["disk_space", "io_performance", "storage_backend_issues"],
        ),
        (
            &["infrastructure failure", "no junit file"],
            &["ci_infrastructure", "job_setup_failure"],
        ),
    ];

    let name = test_name.to_lowercase();
    let causes: Vec<&'static str> = HINTS
        .iter()
        .filter(|(keys, _)| keys.iter().any(|k| name.contains(k)))
        .flat_map(|(_, causes)| causes.iter().copied())
        .collect();

    if causes.is_empty() {
        vec!["unknown", "investigate_logs"]
    } else {
        causes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_infrastructure_markers() {
        assert_eq!(
            categorize("Infrastructure failure (ABORTED)"),
            FailureCategory::InfraTimeout
        );
        assert_eq!(
            categorize("Infrastructure failure (ERROR)"),
            FailureCategory::InfraError
        );
        assert_eq!(
            categorize("Infrastructure failure (FAILURE)"),
            FailureCategory::Infrastructure
        );
        // marker outranks keywords
        assert_eq!(
            categorize("infrastructure failure on network lane"),
            FailureCategory::Infrastructure
        );
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(
            categorize("[sig-network] bridge binding"),
            FailureCategory::Network
        );
        assert_eq!(
            categorize("should migrate a VM with a PVC"),
            FailureCategory::Storage
        );
        assert_eq!(
            categorize("[sig-compute] Live Migration"),
            FailureCategory::Migration
        );
        assert_eq!(categorize("VM lifecycle"), FailureCategory::Compute);
        assert_eq!(
            categorize("virt-operator upgrade"),
            FailureCategory::Operator
        );
        assert_eq!(categorize("something else"), FailureCategory::General);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_value(FailureCategory::InfraTimeout).unwrap(),
            serde_json::json!("infra-timeout")
        );
    }

    #[test]
    fn test_causes_never_empty() {
        assert_eq!(potential_causes("x"), ["unknown", "investigate_logs"]);
        let causes = potential_causes("live migration timeout");
        assert_eq!(&causes[..3], ["timeout", "resource_contention", "slow_operations"]);
        assert!(causes.contains(&"migration_timeout"));
    }

    proptest! {
        #[test]
        fn prop_case_insensitive(name in "[a-zA-Z ()-]{0,40}") {
            prop_assert_eq!(categorize(&name), categorize(&name.to_uppercase()));
        }
    }
}
