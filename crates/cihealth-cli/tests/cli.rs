#![allow(deprecated)] // cargo_bin is deprecated but still supported by assert_cmd
//! End-to-end CLI runs against a wiremock mirror of the CI endpoints.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_PATH: &str =
    "kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/1/pull-kubevirt-e2e-sig-compute/100";

const JUNIT: &str = r#"<testsuite name="Tests Suite" tests="3" failures="2">
  <testcase name="[sig-compute] VMI should start" classname="Tests Suite" time="1.5">
    <failure message="timed out">Unexpected error: timed out</failure>
  </testcase>
  <testcase name="[sig-compute] should run guest attestation" classname="Tests Suite" time="3"><failure message="boom"/></testcase>
  <testcase name="[sig-compute] passes" classname="Tests Suite" time="0.1"/>
</testsuite>"#;

/// `cihealth` with every endpoint pointed at the mirror.
fn cihealth(mirror: &str) -> Command {
    let mut cmd = Command::cargo_bin("cihealth").expect("cihealth binary");
    cmd.env("CIHEALTH_RESULTS_URL", format!("{mirror}/results.json"))
        .env("CIHEALTH_QUARANTINE_URL", format!("{mirror}/quarantine/index.html"))
        .env("CIHEALTH_PROW_URL", mirror)
        .env("CIHEALTH_GCSWEB_URL", format!("{mirror}/gcs"))
        .env("CIHEALTH_GCS_URL", format!("{mirror}/storage"))
        .env("RUST_LOG", "warn");
    cmd
}

async fn mount_leaderboard(mock_server: &MockServer) -> String {
    let run_url = format!("{}/view/gs/{RUN_PATH}", mock_server.uri());
    let feed = json!({
        "Data": { "SIGRetests": { "FailedJobLeaderBoard": [
            {
                "JobName": "pull-kubevirt-e2e-sig-compute",
                "FailureCount": 1,
                "SuccessCount": 3,
                "FailureURLs": [run_url]
            },
            {
                "JobName": "pull-kubevirt-e2e-sig-network",
                "FailureCount": 1,
                "SuccessCount": 3,
                "FailureURLs": [format!("{}/view/gs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/2/pull-kubevirt-e2e-sig-network/200", mock_server.uri())]
            }
        ]}}
    });
    Mock::given(method("GET"))
        .and(path("/results.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/gcs/{RUN_PATH}/artifacts/junit.functest.xml")))
        .respond_with(ResponseTemplate::new(200).set_body_string(JUNIT))
        .mount(mock_server)
        .await;
    run_url
}

/// Run a command off the async runtime so the mock server keeps serving.
async fn output(mut cmd: Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().expect("run cihealth"))
        .await
        .expect("join")
}

#[test]
fn test_version() {
    Command::cargo_bin("cihealth")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("{}\n", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_missing_job_is_input_error() {
    Command::cargo_bin("cihealth")
        .unwrap()
        .arg("merge")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_since_is_input_error() {
    // rejected before any request is made
    cihealth("http://127.0.0.1:9")
        .args(["merge", "main", "--since", "3x"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid time period format: 3x"));
}

#[test]
fn test_invalid_test_regex_is_input_error() {
    cihealth("http://127.0.0.1:9")
        .args(["merge", "main", "-t", "("])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid test regex"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_counted_json() {
    let mock_server = MockServer::start().await;
    let run_url = mount_leaderboard(&mock_server).await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["merge", "compute", "-c", "-o", "json"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(0));
    let value: Value = serde_json::from_slice(&out.stdout).expect("stdout is JSON");
    assert_eq!(value["test_failure_counts"]["[sig-compute] VMI should start"], 1);
    assert_eq!(value["test_failure_counts"].as_object().unwrap().len(), 2);
    assert_eq!(
        value["failed_tests"]["[sig-compute] VMI should start"][0]["url"],
        run_url.as_str()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_text_marks_quarantined() {
    let mock_server = MockServer::start().await;
    mount_leaderboard(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/quarantine/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ul></ul>"))
        .mount(&mock_server)
        .await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["merge", "sig-compute$", "-c", "-q", "-f"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("1\t[QUARANTINED] [sig-compute] should run guest attestation\n\n"));
    assert!(stdout.contains("1\t[sig-compute] VMI should start\n\n\tUnexpected error: timed out\n\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_streams_urls() {
    let mock_server = MockServer::start().await;
    let run_url = mount_leaderboard(&mock_server).await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["merge", "compute", "-u"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(stdout, format!("{run_url}\n{run_url}\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_feed_error_is_internal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/results.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["merge", "main"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("failed to fetch ci-health results"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lane_without_history_fails() {
    let mock_server = MockServer::start().await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["lane", "pull-nothing", "--summary"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("failed to fetch job history for pull-nothing"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quarantine_list_json() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quarantine/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<li>[QUARANTINE] should hotplug a disk</li>"),
        )
        .mount(&mock_server)
        .await;

    let mut cmd = cihealth(&mock_server.uri());
    cmd.args(["quarantine", "-o", "json"]);
    let out = output(cmd).await;

    assert_eq!(out.status.code(), Some(0));
    let value: Value = serde_json::from_slice(&out.stdout).unwrap();
    let names = value["quarantined_tests"].as_array().unwrap();
    assert!(names.iter().any(|n| n == "should hotplug a disk"));
    assert_eq!(value["count"], names.len());
}
