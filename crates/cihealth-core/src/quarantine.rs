//! Quarantined-test report parsing and matching.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Tests known to be quarantined even when the report page omits them.
pub const KNOWN_QUARANTINED: &[&str] = &[
    "should include VMI infos for a running VM",
    "it should fetch logs for a running VM with logs API",
    "it should not skip any log line even trying to flood the serial console for QOSGuaranteed VMs",
    "should report an error status when image pull error occurs",
    "should have kubevirt_vmi_info correctly configured with guest OS labels",
    "Should force restart a VM with terminationGracePeriodSeconds>0",
    "should permanently add hotplug volume when added to VM, but still unpluggable after restart",
    "should live migrate a container disk vm, with an additional PVC mounted, should stay mounted after migration",
    "should live migrate regular disk several times",
    "should live migrate a container disk vm, several times",
    "should migrate with a downwardMetrics channel",
    "should successfully upgrade virt-handler",
    "should run guest attestation",
];

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\[QUARANTINE\]|\[test_id:\d+\])\s*([^<\[\n]+)")
            .expect("static quarantine regex")
    })
}

/// Set of quarantined test names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuarantineSet {
    names: BTreeSet<String>,
}

impl QuarantineSet {
    /// Names scraped from the report, unioned with [`KNOWN_QUARANTINED`].
    pub fn from_report(html: &str) -> Self {
        let mut names: BTreeSet<String> = entry_regex()
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|name| !name.is_empty() && !name.contains('['))
            .map(String::from)
            .collect();
        names.extend(KNOWN_QUARANTINED.iter().map(|s| s.to_string()));
        Self { names }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact match, or `test_name` contains a quarantined name.
    ///
    /// Substring matching can over-match short names; kept for parity with
    /// the report's naming, which drops the `[sig-*]` prefixes.
    pub fn is_quarantined(&self, test_name: &str) -> bool {
        self.names.contains(test_name) || self.names.iter().any(|q| test_name.contains(q.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
