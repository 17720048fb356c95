//! Tail of a run's `build-log.txt`, trimmed to the lines worth reading.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::client::CiHealthClient;
use crate::error::HealthResult;

/// Lines kept at most.
const MAX_LINES: usize = 50;

/// Trailing lines kept regardless of content.
const ALWAYS_KEEP: usize = 30;

/// Size cap of the returned context, in bytes.
const MAX_CONTEXT: usize = 2000;

/// Prefix of the log searched for the tested commit.
const COMMIT_SCAN_BYTES: usize = 8192;

const ERROR_MARKERS: &[&str] = &[
    "error",
    "Error",
    "ERROR",
    "failed",
    "Failed",
    "FAILED",
    "panic",
    "Panic",
    "PANIC",
    "timeout",
    "Timeout",
    "TIMEOUT",
    "aborted",
    "Aborted",
    "ABORTED",
    "killed",
    "Killed",
    "KILLED",
    "exit code",
    "Exit code",
    "exit status",
    "Another command holds the client lock",
    "Waiting for it to complete",
    "deadline exceeded",
    "connection refused",
    "no space left on device",
];

impl CiHealthClient {
    /// Relevant tail of the build log beside a run's artifacts.
    ///
    /// A missing log is an `Http` error with status 404.
    pub async fn fetch_build_log_context(&self, run_url: &str) -> HealthResult<String> {
        let url = self.config().build_log_url(run_url);
        debug!(url = %url, "fetching build log");
        let log = self.get_required(&url).await?;
        Ok(extract_build_log_context(&log))
    }

    /// Commit sha named near the top of the build log, if any.
    pub async fn commit_from_build_log(&self, run_url: &str) -> Option<String> {
        let url = self.config().build_log_url(run_url);
        match self.get_required(&url).await {
            Ok(log) => commit_from_log(&log),
            Err(e) => {
                debug!(url = %url, error = %e, "build log unavailable");
                None
            }
        }
    }
}

/// Keep up to [`MAX_LINES`] trailing non-empty lines: the last
/// [`ALWAYS_KEEP`] unconditionally, older ones only when they carry an
/// error marker. The result is capped at [`MAX_CONTEXT`] bytes, cut on a
/// line boundary.
pub fn extract_build_log_context(log: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in log.lines().rev().map(str::trim) {
        if kept.len() >= MAX_LINES {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if kept.len() < ALWAYS_KEEP || ERROR_MARKERS.iter().any(|m| line.contains(m)) {
            kept.push(line);
        }
    }
    kept.reverse();
    cap_context(kept.join("\n"))
}

fn cap_context(context: String) -> String {
    if context.len() <= MAX_CONTEXT {
        return context;
    }
    let mut start = context.len() - MAX_CONTEXT;
    while !context.is_char_boundary(start) {
        start += 1;
    }
    let tail = &context[start..];
    match tail.find('\n') {
        Some(idx) => tail[idx + 1..].to_string(),
        None => tail.to_string(),
    }
}

fn commit_patterns() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"Checking out ([a-f0-9]{40})",
            r"HEAD is now at ([a-f0-9]{7,40})",
            r"commit[:\s]+([a-f0-9]{40})",
            r"PULL_PULL_SHA[=:\s]+([a-f0-9]{40})",
            r"PULL_BASE_SHA[=:\s]+([a-f0-9]{40})",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static commit regex"))
        .collect()
    })
}

/// First commit sha matched in the head of a build log, by pattern priority.
pub fn commit_from_log(log: &str) -> Option<String> {
    let mut end = log.len().min(COMMIT_SCAN_BYTES);
    while !log.is_char_boundary(end) {
        end -= 1;
    }
    let head = &log[..end];
    commit_patterns()
        .iter()
        .find_map(|re| re.captures(head))
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::HealthConfig;
    use crate::error::HealthError;
    use crate::fetch::memory::MemoryFetcher;

    #[test]
    fn test_keeps_recent_tail() {
        let log = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n\n");
        assert_eq!(extract_build_log_context(&log).lines().count(), 10);
    }

    #[test]
    fn test_older_lines_need_marker() {
        let mut lines = vec!["early ERROR: disk".to_string(), "early noise".to_string()];
        lines.extend((0..ALWAYS_KEEP).map(|i| format!("step {i}")));
        let context = extract_build_log_context(&lines.join("\n"));
        assert!(context.starts_with("early ERROR: disk\nstep 0"));
        assert!(!context.contains("early noise"));
    }

    #[test]
    fn test_line_cap() {
        let log = (0..200).map(|i| format!("failed {i}")).collect::<Vec<_>>().join("\n");
        let context = extract_build_log_context(&log);
        assert_eq!(context.lines().count(), MAX_LINES);
        assert!(context.ends_with("failed 199"));
    }

    #[test]
    fn test_size_cap_on_line_boundary() {
        let log = (0..40)
            .map(|i| format!("{i:02} {}", "x".repeat(97)))
            .collect::<Vec<_>>()
            .join("\n");
        let context = extract_build_log_context(&log);
        assert!(context.len() <= MAX_CONTEXT);
        assert!(context.lines().all(|l| l.len() == 100));
        assert!(context.ends_with(&"x".repeat(97)));
    }

    #[test]
    fn test_commit_priority() {
        let sha = "0123456789abcdef0123456789abcdef01234567";
        let log = format!("HEAD is now at abc1234 msg\nChecking out {sha}\n");
        assert_eq!(commit_from_log(&log).as_deref(), Some(sha));
        assert_eq!(
            commit_from_log("HEAD is now at abc1234 msg").as_deref(),
            Some("abc1234")
        );
        assert_eq!(commit_from_log("nothing"), None);
    }

    #[tokio::test]
    async fn test_fetch_build_log_context() {
        let run = "https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/logs/periodic-x/42";
        let fetcher = MemoryFetcher::new().with_body(
            "https://storage.googleapis.com/kubevirt-prow/logs/periodic-x/42/build-log.txt",
            "setup\n\nerror: boom\n",
        );
        let client = CiHealthClient::with_fetcher(HealthConfig::default(), Arc::new(fetcher));
        let context = client.fetch_build_log_context(run).await.unwrap();
        assert_eq!(context, "setup\nerror: boom");

        let missing = client
            .fetch_build_log_context("https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/logs/periodic-x/43")
            .await;
        assert!(matches!(missing, Err(HealthError::Http { status: 404, .. })));
    }
}
