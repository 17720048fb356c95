//! Endpoint configuration and URL layout rules.

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, HealthResult};

/// Where the CI data lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Results feed carrying the failed-job leaderboard.
    #[serde(default = "default_results_url")]
    pub results_url: String,

    /// HTML report listing quarantined tests.
    #[serde(default = "default_quarantine_url")]
    pub quarantine_url: String,

    /// Prow deck base URL (job history, spyglass views).
    #[serde(default = "default_prow_url")]
    pub prow_url: String,

    /// gcsweb base URL (directory listings, JUnit artifacts).
    #[serde(default = "default_gcsweb_url")]
    pub gcsweb_url: String,

    /// Raw object storage base URL (prowjob.json, started.json, build logs).
    #[serde(default = "default_gcs_url")]
    pub gcs_url: String,

    /// Bucket holding prow artifacts.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub layout: UrlLayout,
}

fn default_results_url() -> String {
    "https://kubevirt.io/ci-health/output/kubevirt/kubevirt/results.json".to_string()
}

fn default_quarantine_url() -> String {
    "https://storage.googleapis.com/kubevirt-prow/reports/quarantined-tests/kubevirt/kubevirt/index.html"
        .to_string()
}

fn default_prow_url() -> String {
    "https://prow.ci.kubevirt.io".to_string()
}

fn default_gcsweb_url() -> String {
    "https://gcsweb.ci.kubevirt.io/gcs".to_string()
}

fn default_gcs_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_bucket() -> String {
    "kubevirt-prow".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    15
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            results_url: default_results_url(),
            quarantine_url: default_quarantine_url(),
            prow_url: default_prow_url(),
            gcsweb_url: default_gcsweb_url(),
            gcs_url: default_gcs_url(),
            bucket: default_bucket(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            layout: UrlLayout::default(),
        }
    }
}

impl HealthConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CIHEALTH_RESULTS_URL` | Results feed |
    /// | `CIHEALTH_QUARANTINE_URL` | Quarantine report |
    /// | `CIHEALTH_PROW_URL` | Prow deck base |
    /// | `CIHEALTH_GCSWEB_URL` | gcsweb base |
    /// | `CIHEALTH_GCS_URL` | Object storage base |
    /// | `CIHEALTH_BUCKET` | Artifact bucket |
    /// | `CIHEALTH_TIMEOUT` | Request timeout (seconds) |
    /// | `CIHEALTH_CONNECT_TIMEOUT` | Connect timeout (seconds) |
    pub fn from_env() -> Self {
        let var = |name: &str, default: fn() -> String| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default)
        };
        Self {
            results_url: var("CIHEALTH_RESULTS_URL", default_results_url),
            quarantine_url: var("CIHEALTH_QUARANTINE_URL", default_quarantine_url),
            prow_url: var("CIHEALTH_PROW_URL", default_prow_url),
            gcsweb_url: var("CIHEALTH_GCSWEB_URL", default_gcsweb_url),
            gcs_url: var("CIHEALTH_GCS_URL", default_gcs_url),
            bucket: var("CIHEALTH_BUCKET", default_bucket),
            timeout_secs: std::env::var("CIHEALTH_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            connect_timeout_secs: std::env::var("CIHEALTH_CONNECT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_connect_timeout),
            layout: UrlLayout::default(),
        }
    }

    /// Point every endpoint at one mirror (a local proxy or a test server).
    ///
    /// Layout: `{base}/results.json`, `{base}/quarantine/index.html`,
    /// prow at `{base}`, gcsweb at `{base}/gcs`, storage at `{base}/storage`.
    pub fn with_mirror(mut self, base: impl AsRef<str>) -> Self {
        let base = base.as_ref().trim_end_matches('/');
        self.results_url = format!("{base}/results.json");
        self.quarantine_url = format!("{base}/quarantine/index.html");
        self.prow_url = base.to_string();
        self.gcsweb_url = format!("{base}/gcs");
        self.gcs_url = format!("{base}/storage");
        self
    }

    /// Set the results feed URL.
    pub fn with_results_url(mut self, url: impl Into<String>) -> Self {
        self.results_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Reject URLs that cannot be parsed and zero timeouts.
    pub fn validate(&self) -> HealthResult<()> {
        for (name, value) in [
            ("results_url", &self.results_url),
            ("quarantine_url", &self.quarantine_url),
            ("prow_url", &self.prow_url),
            ("gcsweb_url", &self.gcsweb_url),
            ("gcs_url", &self.gcs_url),
        ] {
            url::Url::parse(value).map_err(|e| HealthError::Config {
                message: format!("{name} '{value}' is not a valid URL: {e}"),
            })?;
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(HealthError::Config {
                message: "timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// History pages of presubmit runs.
    pub fn presubmit_history_url(&self, job: &str) -> String {
        format!(
            "{}/job-history/gs/{}/pr-logs/directory/{}",
            self.prow_url.trim_end_matches('/'),
            self.bucket,
            job
        )
    }

    /// History pages of periodic and postsubmit runs.
    pub fn periodic_history_url(&self, job: &str) -> String {
        format!(
            "{}/job-history/gs/{}/logs/{}",
            self.prow_url.trim_end_matches('/'),
            self.bucket,
            job
        )
    }

    /// gcsweb directory listing of batch runs.
    pub fn batch_listing_url(&self, job: &str) -> String {
        format!(
            "{}/{}/pr-logs/pull/batch/{}/",
            self.gcsweb_url.trim_end_matches('/'),
            self.bucket,
            job
        )
    }

    /// Spyglass view of a batch run.
    pub fn batch_run_url(&self, job: &str, build_id: &str) -> String {
        format!(
            "{}{}/{}/pr-logs/pull/batch/{}/{}",
            self.prow_url.trim_end_matches('/'),
            self.layout.view_marker,
            self.bucket,
            job,
            build_id
        )
    }

    /// Make a relative spyglass link absolute.
    pub fn absolute_prow_link(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!(
                "{}/{}",
                self.prow_url.trim_end_matches('/'),
                link.trim_start_matches('/')
            )
        }
    }

    /// JUnit artifact behind a leaderboard failure URL.
    pub fn junit_url(&self, run_url: &str) -> String {
        let dir = with_trailing_slash(self.layout.rebase(run_url, &self.gcsweb_url));
        format!("{dir}{}", self.layout.junit_artifact)
    }

    /// Artifact directory of a run in object storage (ends with `/`).
    pub fn artifacts_url(&self, run_url: &str) -> String {
        with_trailing_slash(self.layout.rebase(run_url, &self.gcs_url))
    }

    pub fn prowjob_url(&self, run_url: &str) -> String {
        format!("{}prowjob.json", self.artifacts_url(run_url))
    }

    pub fn started_url(&self, run_url: &str) -> String {
        format!("{}started.json", self.artifacts_url(run_url))
    }

    pub fn build_log_url(&self, run_url: &str) -> String {
        format!("{}build-log.txt", self.artifacts_url(run_url))
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Positional conventions of prow URLs.
///
/// Run URLs look like
/// `https://prow.ci.kubevirt.io/view/gs/<bucket>/pr-logs/pull/<org_repo>/<pr>/<job>/<build>`;
/// leaderboard URLs sometimes carry a doubled slash before `view`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlLayout {
    /// Path prefix that separates the prow host from the storage path.
    #[serde(default = "default_view_marker")]
    pub view_marker: String,

    /// JUnit artifact read by the failure processor.
    #[serde(default = "default_junit_artifact")]
    pub junit_artifact: String,

    /// JUnit artifacts tried, in order, when enriching a run.
    #[serde(default = "default_junit_candidates")]
    pub junit_candidates: Vec<String>,

    /// Segment the job name is counted from.
    #[serde(default = "default_job_name_anchor")]
    pub job_name_anchor: String,

    /// Distance from the anchor to the job name segment.
    #[serde(default = "default_job_name_offset")]
    pub job_name_offset: usize,
}

fn default_view_marker() -> String {
    "/view/gs".to_string()
}

fn default_junit_artifact() -> String {
    "artifacts/junit.functest.xml".to_string()
}

fn default_junit_candidates() -> Vec<String> {
    [
        "artifacts/junit/junit.unittests.xml",
        "artifacts/junit.functest.xml",
        "artifacts/junit.xml",
        "artifacts/tests/junit.xml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_job_name_anchor() -> String {
    "pr-logs".to_string()
}

fn default_job_name_offset() -> usize {
    4
}

impl Default for UrlLayout {
    fn default() -> Self {
        Self {
            view_marker: default_view_marker(),
            junit_artifact: default_junit_artifact(),
            junit_candidates: default_junit_candidates(),
            job_name_anchor: default_job_name_anchor(),
            job_name_offset: default_job_name_offset(),
        }
    }
}

impl UrlLayout {
    /// Replace everything up to the view marker with `base`.
    ///
    /// URLs without the marker are returned unchanged.
    pub fn rebase(&self, url: &str, base: &str) -> String {
        let marker = format!("{}/", self.view_marker);
        match url.find(&marker) {
            Some(idx) => {
                let tail = &url[idx + self.view_marker.len()..];
                format!("{}{}", base.trim_end_matches('/'), tail)
            }
            None => url.to_string(),
        }
    }

    /// Job name inside a run URL.
    ///
    /// Counted from the anchor when present, otherwise the segment before a
    /// numeric build id.
    pub fn job_name<'a>(&self, url: &'a str) -> Option<&'a str> {
        let parts: Vec<&str> = url.trim_end_matches('/').split('/').collect();
        match parts.iter().position(|p| *p == self.job_name_anchor) {
            Some(anchor) => parts
                .get(anchor + self.job_name_offset)
                .copied()
                .filter(|p| !p.is_empty()),
            None => match parts.as_slice() {
                [.., job, build]
                    if !job.is_empty() && build.chars().all(|c| c.is_ascii_digit()) && !build.is_empty() =>
                {
                    Some(*job)
                }
                _ => None,
            },
        }
    }

    /// Lane-run id: the last non-empty path segment.
    pub fn lane_run_id<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const RUN: &str = "https://prow.ci.kubevirt.io//view/gs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/12345/pull-kubevirt-e2e-k8s-1.30-sig-compute/1790000000000000000";

    #[test]
    fn test_junit_url_rewrites_view_prefix() {
        let config = HealthConfig::default();
        assert_eq!(
            config.junit_url(RUN),
            "https://gcsweb.ci.kubevirt.io/gcs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/12345/pull-kubevirt-e2e-k8s-1.30-sig-compute/1790000000000000000/artifacts/junit.functest.xml"
        );
    }

    #[test]
    fn test_prowjob_url_single_slash() {
        let config = HealthConfig::default();
        let run = "https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/logs/periodic-x/42";
        assert_eq!(
            config.prowjob_url(run),
            "https://storage.googleapis.com/kubevirt-prow/logs/periodic-x/42/prowjob.json"
        );
    }

    #[test]
    fn test_unknown_urls_pass_through() {
        let config = HealthConfig::default();
        assert_eq!(
            config.junit_url("http://x/run/abc123"),
            "http://x/run/abc123/artifacts/junit.functest.xml"
        );
    }

    #[test]
    fn test_job_name_and_lane_run() {
        let layout = UrlLayout::default();
        assert_eq!(
            layout.job_name(RUN),
            Some("pull-kubevirt-e2e-k8s-1.30-sig-compute")
        );
        assert_eq!(layout.job_name("http://x/run/abc123"), None);
        assert_eq!(
            layout.job_name("https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/logs/periodic-x/42"),
            Some("periodic-x")
        );
        assert_eq!(layout.lane_run_id(RUN), Some("1790000000000000000"));
        assert_eq!(layout.lane_run_id("http://x/run/abc123/"), Some("abc123"));
    }

    #[test]
    fn test_history_urls() {
        let config = HealthConfig::default();
        assert_eq!(
            config.presubmit_history_url("pull-a"),
            "https://prow.ci.kubevirt.io/job-history/gs/kubevirt-prow/pr-logs/directory/pull-a"
        );
        assert_eq!(
            config.periodic_history_url("periodic-a"),
            "https://prow.ci.kubevirt.io/job-history/gs/kubevirt-prow/logs/periodic-a"
        );
        assert_eq!(
            config.batch_run_url("pull-a", "7"),
            "https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/pr-logs/pull/batch/pull-a/7"
        );
        assert_eq!(
            config.absolute_prow_link("/view/gs/a/b"),
            "https://prow.ci.kubevirt.io/view/gs/a/b"
        );
    }

    #[test]
    fn test_validate() {
        assert!(HealthConfig::default().validate().is_ok());
        let bad = HealthConfig::default().with_results_url("not a url");
        assert!(matches!(bad.validate(), Err(HealthError::Config { .. })));
        let zero = HealthConfig::default().with_timeout_secs(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("CIHEALTH_BUCKET", "my-bucket");
        std::env::set_var("CIHEALTH_TIMEOUT", "5");
        std::env::set_var("CIHEALTH_CONNECT_TIMEOUT", "nope");
        let config = HealthConfig::from_env();
        std::env::remove_var("CIHEALTH_BUCKET");
        std::env::remove_var("CIHEALTH_TIMEOUT");
        std::env::remove_var("CIHEALTH_CONNECT_TIMEOUT");

        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 15);
        assert_eq!(config.prow_url, "https://prow.ci.kubevirt.io");
    }
}
