//! Short names for commonly used job regexes.

/// Alias to job regex.
pub const JOB_REGEX_ALIASES: &[(&str, &str)] = &[
    ("main", "sig-[a-zA-Z0-9_-]+$"),
    ("1.6", "release-1.6$"),
    ("1.5", "release-1.5$"),
    ("1.4", "release-1.4$"),
    (
        "compute",
        "sig-compute$|sig-compute-serial$|sig-compute-migrations$|sig-operator$|.*arm64.*",
    ),
    (
        "compute-1.6",
        "sig-compute-1.6$|sig-compute-serial-1.6$|sig-compute-migrations-1.6$|sig-operator-1.6$|.*arm64.*-1.6$",
    ),
    ("network", "sig-network$"),
    ("storage", "sig-storage$"),
];

/// Expand an alias; anything else is returned as a regex unchanged.
pub fn resolve_job_regex(input: &str) -> &str {
    JOB_REGEX_ALIASES
        .iter()
        .find(|(alias, _)| *alias == input)
        .map_or(input, |(_, regex)| *regex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_compute_alias() {
        let re = Regex::new(resolve_job_regex("compute")).unwrap();
        assert!(re.is_match("pull-kubevirt-e2e-k8s-1.30-sig-compute-serial"));
        assert!(re.is_match("pull-kubevirt-e2e-k8s-1.30-sig-compute"));
        assert!(re.is_match("pull-kubevirt-e2e-arm64"));
        assert!(!re.is_match("pull-kubevirt-e2e-k8s-1.30-sig-network"));
    }

    #[test]
    fn test_release_aliases_anchor_at_end() {
        let re = Regex::new(resolve_job_regex("1.5")).unwrap();
        assert!(re.is_match("periodic-kubevirt-e2e-release-1.5"));
        assert!(!re.is_match("periodic-kubevirt-e2e-release-1.5-sig-network"));
    }

    #[test]
    fn test_plain_regex_passes_through() {
        assert_eq!(resolve_job_regex("sig-storage-.*"), "sig-storage-.*");
        assert_eq!(resolve_job_regex(""), "");
    }

    #[test]
    fn test_every_alias_compiles() {
        for (alias, regex) in JOB_REGEX_ALIASES {
            assert!(Regex::new(regex).is_ok(), "{alias}");
        }
    }
}
