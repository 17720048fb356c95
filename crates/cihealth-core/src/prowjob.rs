//! `prowjob.json` metadata.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{HealthError, HealthResult};
use crate::types::{JobType, PullRequestRef, RunStatus};

const JOB_TYPE_LABEL: &str = "prow.k8s.io/type";

/// What a run's prowjob document says about it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProwJobInfo {
    pub status: RunStatus,
    pub job_type: Option<JobType>,
    /// Start time, falling back to the object's creation time.
    pub started: Option<String>,
    pub pull_request: Option<PullRequestRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ProwJob {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: Spec,
    #[serde(default)]
    status: Status,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(rename = "creationTimestamp", default)]
    creation_timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Spec {
    #[serde(rename = "type", default)]
    job_type: Option<String>,
    #[serde(default)]
    refs: Option<Refs>,
}

#[derive(Debug, Default, Deserialize)]
struct Refs {
    #[serde(default)]
    org: String,
    #[serde(default)]
    base_sha: String,
    #[serde(default)]
    pulls: Vec<Pull>,
}

#[derive(Debug, Default, Deserialize)]
struct Pull {
    #[serde(default)]
    number: u64,
    #[serde(default)]
    author: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    head_ref: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    commit_link: String,
    #[serde(default)]
    author_link: String,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    state: String,
    #[serde(rename = "startTime", default)]
    start_time: Option<String>,
}

/// Decode a prowjob document fetched from `url`.
pub fn parse_prowjob(url: &str, body: &str) -> HealthResult<ProwJobInfo> {
    let job: ProwJob = serde_json::from_str(body).map_err(|e| HealthError::parse(url, e))?;

    let job_type = job
        .metadata
        .labels
        .get(JOB_TYPE_LABEL)
        .map(String::as_str)
        .or(job.spec.job_type.as_deref())
        .and_then(|t| t.parse().ok());

    let pull_request = job.spec.refs.and_then(|refs| {
        let org = refs.org;
        let base_sha = refs.base_sha;
        refs.pulls.into_iter().next().map(|p| PullRequestRef {
            is_fork: !org.is_empty() && p.author != org,
            number: p.number,
            author: p.author,
            sha: p.sha,
            title: p.title,
            head_ref: p.head_ref,
            link: p.link,
            commit_link: p.commit_link,
            author_link: p.author_link,
            base_sha,
        })
    });

    Ok(ProwJobInfo {
        status: RunStatus::from_prow_state(&job.status.state),
        job_type,
        started: job
            .status
            .start_time
            .or(job.metadata.creation_timestamp)
            .filter(|t| !t.is_empty()),
        pull_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presubmit_prowjob() {
        let body = r#"{
          "metadata": {"labels": {"prow.k8s.io/type": "presubmit"}, "creationTimestamp": "2024-05-01T10:00:00Z"},
          "spec": {"type": "presubmit", "refs": {"org": "kubevirt", "repo": "kubevirt", "base_sha": "abc",
                   "pulls": [{"number": 11800, "author": "octo", "sha": "def", "title": "Fix it",
                              "head_ref": "fix", "link": "https://github.com/kubevirt/kubevirt/pull/11800"}]}},
          "status": {"state": "failure", "startTime": "2024-05-01T10:00:05Z"}
        }"#;
        let info = parse_prowjob("u", body).unwrap();
        assert_eq!(info.status, RunStatus::Failure);
        assert_eq!(info.job_type, Some(JobType::Presubmit));
        assert_eq!(info.started.as_deref(), Some("2024-05-01T10:00:05Z"));
        let pr = info.pull_request.unwrap();
        assert_eq!(pr.number, 11800);
        assert_eq!(pr.base_sha, "abc");
        assert!(pr.is_fork);
    }

    #[test]
    fn test_periodic_without_refs() {
        let body = r#"{"metadata": {"creationTimestamp": "2024-05-01T10:00:00Z"},
                       "spec": {"type": "periodic"}, "status": {"state": "pending"}}"#;
        let info = parse_prowjob("u", body).unwrap();
        assert_eq!(info.status, RunStatus::Pending);
        assert_eq!(info.job_type, Some(JobType::Periodic));
        assert_eq!(info.started.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(info.pull_request.is_none());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            parse_prowjob("u", "<html/>"),
            Err(HealthError::Parse { .. })
        ));
    }
}
