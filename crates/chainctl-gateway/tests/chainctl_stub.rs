//! End-to-end gateway tests against a stub `chainctl` script, covering
//! both editor flows, prompt confirmation and JSON listings.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use chainctl_gateway::{
    AssemblyRequest, BuildResult, BuildTool, ChainctlGateway, GatewayError,
};

const STUB: &str = r#"#!/bin/sh
# Stand-in for chainctl: answers the handful of invocations the gateway makes.
[ -n "$CHAINCTL_TOKEN" ] || { echo "not authenticated" 1>&2; exit 9; }

case "$*" in
  version*)
    echo "chainctl 0.0.0-stub"
    ;;
  *"--save-as same-config"*)
    echo "No changes detected."
    ;;
  *"--save-as"*)
    read -r confirm
    [ "$confirm" = "y" ] || { echo "prompt not confirmed" 1>&2; exit 8; }
    tmp=$(mktemp)
    "$EDITOR" "$tmp" || exit 7
    echo "Applying build config to repo"
    cat "$tmp"
    rm -f "$tmp"
    ;;
  *"--repo broken"*)
    echo "Error: repo not found" 1>&2
    exit 3
    ;;
  *"build list"*)
    echo '{"reports":[{"completionTime":"2024-05-01T10:00:00Z","result":"Success"},{"result":"Pending"}]}'
    ;;
  *"repos list"*)
    echo '{"items":[{"name":"python"},{"name":"nginx"}]}'
    ;;
  *"build edit"*)
    tmp=$(mktemp)
    printf 'contents:\n  packages:\n    - curl\n    - jq\n' > "$tmp"
    "$EDITOR" "$tmp"
    status=$?
    rm -f "$tmp"
    exit "$status"
    ;;
  *)
    echo "unexpected invocation: $*" 1>&2
    exit 2
    ;;
esac
"#;

fn stub_gateway() -> (tempfile::TempDir, ChainctlGateway) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chainctl");
    std::fs::write(&path, STUB).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();

    let gateway = ChainctlGateway::new("org-123", "cgr.dev", "token-abc").with_binary(path);
    (dir, gateway)
}

#[tokio::test]
async fn test_version_probe() {
    let (_dir, gateway) = stub_gateway();
    assert_eq!(gateway.version().await.unwrap(), "chainctl 0.0.0-stub");
}

#[tokio::test]
async fn test_create_assembly_feeds_config_through_editor() {
    let (_dir, gateway) = stub_gateway();
    let outcome = gateway
        .create_assembly(&AssemblyRequest {
            base_repo: "python".to_string(),
            request_name: "My Python App!!".to_string(),
            packages: vec!["curl".to_string(), "git".to_string()],
            description: "python with http tooling".to_string(),
        })
        .await
        .unwrap();

    assert!(outcome.created);
    assert!(!outcome.no_change);
    assert_eq!(outcome.custom_name, "my-python-app");
    assert_eq!(outcome.image_url, "cgr.dev/my-python-app:latest");
    assert!(outcome.assembly_id.starts_with("custom-"));
    // The stub echoes the config the editor wrote, so the rendered
    // packages must have survived the round trip.
    assert!(outcome.raw_output.contains("- curl"));
    assert!(outcome.raw_output.contains("- git"));
    assert!(outcome.raw_output.contains("# python with http tooling"));
}

#[tokio::test]
async fn test_create_assembly_no_changes() {
    let (_dir, gateway) = stub_gateway();
    let outcome = gateway
        .create_assembly(&AssemblyRequest {
            base_repo: "python".to_string(),
            request_name: "Same Config".to_string(),
            packages: vec!["curl".to_string()],
            description: String::new(),
        })
        .await
        .unwrap();

    assert!(!outcome.created);
    assert!(outcome.no_change);
    assert_eq!(outcome.custom_name, "same-config");
}

#[tokio::test]
async fn test_get_build_config_reads_through_failing_editor() {
    let (_dir, gateway) = stub_gateway();
    let config = gateway.get_build_config("python").await.unwrap();
    assert_eq!(config.packages.len(), 2);
    assert!(config.packages.contains("curl"));
    assert!(config.packages.contains("jq"));
}

#[tokio::test]
async fn test_get_build_config_error_text_is_not_an_empty_config() {
    let (_dir, gateway) = stub_gateway();
    let err = gateway.get_build_config("broken").await;
    assert!(matches!(err, Err(GatewayError::Parse(_))));
}

#[tokio::test]
async fn test_list_repos() {
    let (_dir, gateway) = stub_gateway();
    let repos = gateway.list_repos().await.unwrap();
    let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["python", "nginx"]);
}

#[tokio::test]
async fn test_list_builds_stamps_repo_and_parses_results() {
    let (_dir, gateway) = stub_gateway();
    let builds = gateway.list_builds("python").await.unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].repo_name, "python");
    assert_eq!(builds[0].result, BuildResult::Success);
    assert!(builds[0].completion_time.is_some());
    assert_eq!(builds[1].result, BuildResult::Pending);
    assert!(builds[1].completion_time.is_none());
}

#[tokio::test]
async fn test_missing_binary_is_an_external_tool_error() {
    let gateway = ChainctlGateway::new("org-123", "cgr.dev", "token-abc")
        .with_binary(PathBuf::from("/nonexistent/chainctl"));
    let err = gateway.version().await;
    assert!(matches!(err, Err(GatewayError::ExternalTool { .. })));
}
