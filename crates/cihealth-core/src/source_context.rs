//! Source locations behind a failure, linked to the repository on GitHub.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::CiHealthClient;
use crate::error::{HealthError, HealthResult};
use crate::types::PullRequestRef;

/// Error messages built from several lines are cut to this many characters.
const MAX_ERROR_MESSAGE: usize = 200;

const ERROR_PREFIXES: &[&str] = &["Panic:", "Error:", "Failed:"];

const ERROR_MARKERS: &[&str] = &[
    "error:",
    "Error:",
    "Unexpected",
    "Expected",
    "occurred",
    "deadline exceeded",
];

const SYSTEM_PREFIXES: &[&str] = &[
    "runtime/",
    "external/io_bazel_rules_go/stdlib_/src/runtime/",
    "/usr/",
    "/go/",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// What a JUnit failure body says about where the test broke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub test_name: String,
    pub failure_type: String,
    pub error_message: String,
    pub primary_file: String,
    pub primary_line: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<StackFrame>,
}

/// Parse a failure body of the form
///
/// ```text
/// pkg/virt-controller/services/template_test.go:2689
/// Expected
///     <bool>: false
/// to be true
///
/// Full stack:
/// kubevirt.io/kubevirt/pkg/virt-controller/services.init.func7.6.24.3()
///         pkg/virt-controller/services/template_test.go:2695 +0x2f4
/// ```
pub fn parse_failure_text(text: &str) -> FailureInfo {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut info = FailureInfo::default();

    let first = lines.first().copied().unwrap_or_default();
    if first.contains(':') && !first.contains(' ') {
        if let Some((file, line)) = file_and_line(first) {
            info.primary_file = file;
            info.primary_line = line;
        }
        info.failure_type = "Test Failure".to_string();
    } else if let Some((kind, location)) = first.split_once(' ') {
        info.failure_type = kind.to_string();
        if let Some((file, line)) = file_and_line(location) {
            info.primary_file = file;
            info.primary_line = line;
        }
    }

    info.error_message = error_message(&lines);
    info.stack_trace = stack_frames(&lines, &info.primary_file, info.primary_line);

    if info.error_message.is_empty() {
        info.error_message = info.failure_type.clone();
    }
    if let Some(stem) = info.primary_file.strip_suffix("_test.go") {
        let base = stem.rsplit('/').next().unwrap_or(stem);
        info.test_name = format!("{base} test");
    }
    info
}

fn error_message(lines: &[&str]) -> String {
    let mut collected = Vec::new();
    for line in lines.iter().skip(1).filter(|l| !l.is_empty()) {
        if let Some(prefix) = ERROR_PREFIXES.iter().find(|p| line.starts_with(*p)) {
            return line[prefix.len()..].trim().to_string();
        }
        if ERROR_MARKERS.iter().any(|m| line.contains(m)) {
            collected.push(*line);
        }
    }

    let joined = collected.join(" ");
    if joined.chars().count() > MAX_ERROR_MESSAGE {
        let cut: String = joined.chars().take(MAX_ERROR_MESSAGE).collect();
        format!("{cut}...")
    } else {
        joined
    }
}

fn stack_frames(lines: &[&str], primary_file: &str, primary_line: u32) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut in_stack = false;
    let mut pending_function: Option<&str> = None;

    for (i, line) in lines.iter().enumerate() {
        if line.contains("Full stack:") {
            in_stack = true;
            continue;
        }
        if in_stack {
            if line.is_empty() {
                continue;
            }
            if line.contains("()") {
                pending_function = Some(*line);
                continue;
            }
            if let Some(mut frame) = parse_frame(line) {
                if let Some(function) = pending_function.take() {
                    frame.function = function.replacen("()", "", 1).trim().to_string();
                }
                frames.push(frame);
            }
        } else if i > 0 && line.contains(".go:") && !line.contains("Unexpected") {
            if let Some(frame) = parse_frame(line) {
                if frame.file != primary_file || frame.line != primary_line {
                    frames.push(frame);
                }
            }
        }
    }
    frames
}

/// `pkg/file.go:123 +0x2f4` or `pkg/file.go:123`.
fn parse_frame(line: &str) -> Option<StackFrame> {
    let location = if line.contains("+0x") {
        line.split_whitespace().next()?
    } else if line.contains(".go:") {
        line
    } else {
        return None;
    };
    let (file, line) = file_and_line(location)?;
    Some(StackFrame {
        function: String::new(),
        file,
        line,
    })
}

/// Split `path:NN...` into the path and the first run of digits after the colon.
fn file_and_line(location: &str) -> Option<(String, u32)> {
    let mut parts = location.split(':');
    let file = parts.next().filter(|f| !f.is_empty())?;
    let rest = parts.next()?;
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    Some((file.to_string(), digits.parse().unwrap_or(0)))
}

fn repo_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/pull/([^/]+)_([^/]+)/(\d+)/").expect("static repo regex"))
}

/// Repository and revision a presubmit run tested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub owner: String,
    pub repository: String,
    /// Commit sha, `main` when unknown.
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_repo_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_remote_url: Option<String>,
}

/// Owner, repository and PR number from a `/pull/{owner}_{repo}/{n}/` run URL.
pub fn repository_info(job_url: &str) -> HealthResult<RepositoryInfo> {
    let caps = repo_regex().captures(job_url).ok_or_else(|| {
        HealthError::parse(job_url, "unable to extract repository information from URL")
    })?;
    Ok(RepositoryInfo {
        owner: caps[1].to_string(),
        repository: caps[2].to_string(),
        commit: "main".to_string(),
        pull_request: caps[3].parse().ok(),
        ..RepositoryInfo::default()
    })
}

impl RepositoryInfo {
    /// Pin the commit and branch to what the prowjob recorded.
    pub fn with_pull_request(mut self, pr: &PullRequestRef) -> Self {
        let commit = if pr.sha.is_empty() { &pr.base_sha } else { &pr.sha };
        if !commit.is_empty() {
            self.commit = commit.clone();
        }
        if !pr.head_ref.is_empty() {
            self.branch = Some(pr.head_ref.clone());
        }
        if pr.is_fork && !pr.author.is_empty() {
            self.head_repo_owner = Some(pr.author.clone());
            self.fork_remote_url = Some(format!(
                "https://github.com/{}/{}.git",
                pr.author, self.repository
            ));
        }
        self
    }

    pub fn blob_url(&self, path: &str, line: u32) -> String {
        format!(
            "https://github.com/{}/{}/blob/{}/{}#L{}",
            self.owner, self.repository, self.commit, path, line
        )
    }

    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner, self.repository, self.commit, path
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub file_path: String,
    pub line_number: u32,
    pub github_url: String,
    pub raw_url: String,
    pub context: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    pub failure_info: FailureInfo,
    pub repository_info: RepositoryInfo,
    pub source_context: Vec<SourceFile>,
    pub summary: String,
}

/// Link the primary location, and optionally non-runtime stack frames.
pub fn build_source_context(
    failure_info: FailureInfo,
    repository_info: RepositoryInfo,
    include_stack_trace: bool,
) -> SourceContext {
    let mut files = Vec::new();
    if !failure_info.primary_file.is_empty() && failure_info.primary_line > 0 {
        files.push(source_file(
            &failure_info.primary_file,
            failure_info.primary_line,
            &repository_info,
            "primary failure location".to_string(),
        ));
    }
    if include_stack_trace {
        for frame in &failure_info.stack_trace {
            if frame.line > 0 && !is_system_file(&frame.file) {
                files.push(source_file(
                    &frame.file,
                    frame.line,
                    &repository_info,
                    format!("stack trace: {}", frame.function),
                ));
            }
        }
    }

    let summary = format!(
        "Test '{}' failed with '{}' in {}/{}. Primary failure at {}:{}. {} source context files available for analysis.",
        failure_info.test_name,
        failure_info.failure_type,
        repository_info.owner,
        repository_info.repository,
        failure_info.primary_file,
        failure_info.primary_line,
        files.len()
    );
    SourceContext {
        failure_info,
        repository_info,
        source_context: files,
        summary,
    }
}

fn source_file(path: &str, line: u32, repo: &RepositoryInfo, context: String) -> SourceFile {
    let path = clean_file_path(path);
    SourceFile {
        github_url: repo.blob_url(path, line),
        raw_url: repo.raw_url(path),
        file_type: file_type(path).to_string(),
        file_path: path.to_string(),
        line_number: line,
        context,
    }
}

/// Strip bazel output directories and vendored stdlib prefixes.
pub fn clean_file_path(path: &str) -> &str {
    if let Some((_, rest)) = path.split_once("bazel-out/") {
        // bazel-out/<arch>/bin/<path>
        let parts: Vec<&str> = rest.splitn(3, '/').collect();
        if let [_, "bin", tail] = parts.as_slice() {
            if !tail.is_empty() {
                return *tail;
            }
        }
    }
    ["external/io_bazel_rules_go/stdlib_/src/", "./"]
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
}

pub fn is_system_file(path: &str) -> bool {
    SYSTEM_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub fn file_type(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("go") => "go",
        Some("yaml" | "yml") => "yaml",
        Some("json") => "json",
        Some("sh") => "shell",
        Some("py") => "python",
        _ => "text",
    }
}

impl CiHealthClient {
    /// Parse a failure body and link it to the revision the run tested.
    ///
    /// The commit comes from the run's prowjob, then from the build log;
    /// `main` when neither names one.
    pub async fn failure_source_context(
        &self,
        failure_text: &str,
        job_url: &str,
        include_stack_trace: bool,
    ) -> HealthResult<SourceContext> {
        let failure_info = parse_failure_text(failure_text);
        let mut repo = repository_info(job_url)?;

        match self.fetch_prowjob(job_url).await {
            Ok(Some(info)) => {
                if let Some(pr) = &info.pull_request {
                    repo = repo.with_pull_request(pr);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(url = %job_url, error = %e, "prowjob unavailable for source context"),
        }
        if repo.commit == "main" {
            if let Some(commit) = self.commit_from_build_log(job_url).await {
                repo.commit = commit;
            }
        }

        Ok(build_source_context(failure_info, repo, include_stack_trace))
    }
}
