//! JSON-RPC round trips against a wiremock mirror of the CI endpoints.

use cihealth_core::{CiHealthClient, HealthConfig};
use cihealth_mcp_server::{McpServer, ServerConfig, ToolContext};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_PATH: &str =
    "kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/1/pull-kubevirt-e2e-sig-compute/100";

const JUNIT: &str = r#"<testsuite name="Tests Suite" tests="2" failures="2">
  <testcase name="[sig-compute] VMI should start" classname="Tests Suite" time="1.5">
    <failure message="timed out">tests/vmi_test.go:42
Unexpected error: timed out</failure>
  </testcase>
  <testcase name="[sig-compute] Live Migration should migrate" classname="Tests Suite" time="3"><failure message="boom"/></testcase>
</testsuite>"#;

fn create_server(mock_server: &MockServer) -> McpServer {
    let config = HealthConfig::default().with_mirror(mock_server.uri());
    let client = CiHealthClient::new(config).expect("failed to create client");
    McpServer::new(ToolContext::new(client, ServerConfig::default()))
}

async fn rpc(server: &McpServer, request: Value) -> Value {
    let line = server
        .handle_line(&request.to_string())
        .await
        .expect("encode failed")
        .expect("expected a response");
    serde_json::from_str(&line).expect("response is not JSON")
}

async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> Value {
    let resp = rpc(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await;
    assert_eq!(resp["id"], 7);
    resp["result"].clone()
}

#[tokio::test]
async fn test_initialize_and_list() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);

    let init = rpc(
        &server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "2024-11-05", "capabilities": {} }
        }),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "cihealth");
    assert!(init["result"]["capabilities"]["tools"].is_object());

    let list = rpc(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let tools = list["result"]["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 8);
    assert!(tools.iter().any(|t| t["name"] == "analyze_job_lane"));
}

#[tokio::test]
async fn test_protocol_errors() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);

    let line = server.handle_line("{not json").await.unwrap().unwrap();
    let resp: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(resp["error"]["code"], -32700);
    assert!(resp["id"].is_null());

    let resp = rpc(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"})).await;
    assert_eq!(resp["error"]["code"], -32601);

    let resp = call_tool_raw(&server, "no_such_tool").await;
    assert_eq!(resp["error"]["code"], -32602);

    let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server
        .handle_line(&notification.to_string())
        .await
        .unwrap()
        .is_none());
    assert!(server.handle_line("   ").await.unwrap().is_none());
}

async fn call_tool_raw(server: &McpServer, name: &str) -> Value {
    rpc(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": name, "arguments": {} }
        }),
    )
    .await
}

#[tokio::test]
async fn test_serve_answers_each_request_line() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);

    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    ]
    .iter()
    .map(|v| format!("{v}\n"))
    .collect::<String>();

    let mut out = Vec::new();
    server
        .serve(input.as_bytes(), &mut out)
        .await
        .expect("serve failed");

    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["result"], json!({}));
    assert_eq!(lines[1]["id"], 2);
}

#[tokio::test]
async fn test_missing_argument_is_tool_error() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);

    let result = call_tool(&server, "get_job_failures", json!({})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Missing 'job_name' argument");
}

#[tokio::test]
async fn test_invalid_period_is_tool_error() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);

    let result = call_tool(
        &server,
        "analyze_job_lane",
        json!({ "job_name": "pull-a", "since": "abc" }),
    )
    .await;
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["error"]["code"], "E_INVALID_PERIOD");
}

#[tokio::test]
async fn test_merge_failures_uses_cached_feed() {
    let mock_server = MockServer::start().await;
    let feed = json!({
        "Data": { "SIGRetests": { "FailedJobLeaderBoard": [{
            "JobName": "pull-kubevirt-e2e-sig-compute",
            "FailureCount": 1,
            "SuccessCount": 0,
            "FailureURLs": [format!("{}/view/gs/{RUN_PATH}", mock_server.uri())]
        }]}}
    });

    Mock::given(method("GET"))
        .and(path("/results.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/gcs/{RUN_PATH}/artifacts/junit.functest.xml")))
        .respond_with(ResponseTemplate::new(200).set_body_string(JUNIT))
        .mount(&mock_server)
        .await;

    let server = create_server(&mock_server);
    let args = json!({ "job_filter": "compute", "include_quarantined": false });

    let result = call_tool(&server, "analyze_merge_failures", args.clone()).await;
    assert_eq!(result["isError"], false);
    let analysis = &result["structuredContent"];
    assert_eq!(analysis["statistics"]["total_failures"], 2);
    assert_eq!(analysis["statistics"]["unique_tests"], 2);
    assert_eq!(analysis["statistics"]["affected_jobs"], 1);
    assert_eq!(
        analysis["by_job"]["pull-kubevirt-e2e-sig-compute"]["failure_count"],
        2
    );
    assert_eq!(
        analysis["summary"],
        "Found 2 total failures across 2 unique tests affecting 1 jobs"
    );

    let search = call_tool(
        &server,
        "search_failure_patterns",
        json!({ "pattern": "timed OUT", "search_in": "failure_messages" }),
    )
    .await;
    assert_eq!(search["structuredContent"]["statistics"]["total_matches"], 1);
    assert_eq!(
        search["structuredContent"]["matches"][0]["test_name"],
        "[sig-compute] VMI should start"
    );
}

#[tokio::test]
async fn test_build_log_context() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/storage/{RUN_PATH}/build-log.txt")))
        .respond_with(ResponseTemplate::new(200).set_body_string("setup\n\nERROR: node lost\n"))
        .mount(&mock_server)
        .await;

    let server = create_server(&mock_server);
    let job_url = format!("{}/view/gs/{RUN_PATH}", mock_server.uri());

    let result = call_tool(&server, "get_build_log_context", json!({ "job_url": job_url })).await;
    assert_eq!(result["isError"], false);
    assert_eq!(result["structuredContent"]["context"], "setup\nERROR: node lost");
    assert_eq!(result["structuredContent"]["line_count"], 2);

    let missing = call_tool(
        &server,
        "get_build_log_context",
        json!({ "job_url": format!("{}/view/gs/kubevirt-prow/logs/periodic-x/1", mock_server.uri()) }),
    )
    .await;
    assert_eq!(missing["isError"], true);
    assert_eq!(missing["structuredContent"]["error"]["code"], "E_NOT_FOUND");
}

#[tokio::test]
async fn test_failure_source_context_defaults_to_main() {
    let mock_server = MockServer::start().await;
    let server = create_server(&mock_server);
    let job_url = format!("{}/view/gs/{RUN_PATH}", mock_server.uri());

    let result = call_tool(
        &server,
        "get_failure_source_context",
        json!({
            "failure_text": "tests/vmi_test.go:42\nUnexpected error: timed out",
            "job_url": job_url
        }),
    )
    .await;
    assert_eq!(result["isError"], false);
    let context = &result["structuredContent"];
    assert_eq!(context["repository_info"]["owner"], "kubevirt");
    assert_eq!(context["repository_info"]["commit"], "main");
    assert_eq!(
        context["source_context"][0]["github_url"],
        "https://github.com/kubevirt/kubevirt/blob/main/tests/vmi_test.go#L42"
    );
}
