//! Tests for approver-tools: ToolResult, ToolRegistry, policy registry, GitHub and Kubernetes tools

use approver_core::ToolsConfig;
use approver_tools::tools::github::{
    list_commits_query, summarize_commit, summarize_commits, MAX_PATCH_CHARS,
};
use approver_tools::tools::kubernetes::{
    list_query, resource_path, resource_plural, strip_noise, summarize_list,
};
use approver_tools::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct EchoTool {
    name: &'static str,
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::Json(args)
    }
}

struct SlowTool;

#[async_trait::async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never finishes"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn offline_client() -> Arc<GitHubClient> {
    Arc::new(GitHubClient::new("http://127.0.0.1:9/", None))
}

fn offline_kube() -> Arc<KubeClient> {
    Arc::new(KubeClient::new("http://127.0.0.1:9/", None))
}

// ===========================================================================
// ToolResult
// ===========================================================================

#[test]
fn tool_result_text() {
    let r = ToolResult::text("hello");
    assert!(!r.is_error());
    assert_eq!(r.to_content_string(), "hello");
}

#[test]
fn tool_result_error() {
    let r = ToolResult::error("boom");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: boom");
}

#[test]
fn tool_result_json() {
    let r = ToolResult::Json(json!({"sha": "abc"}));
    assert!(!r.is_error());
    assert!(r.to_content_string().contains("\"sha\": \"abc\""));
}

// ===========================================================================
// ToolRegistry
// ===========================================================================

#[tokio::test]
async fn registry_default_is_empty() {
    let reg = ToolRegistry::default();
    assert!(reg.is_empty());
    assert!(reg.get_definitions().is_empty());
}

#[tokio::test]
async fn registry_keeps_registration_order() {
    let mut reg = ToolRegistry::new();
    reg.register(EchoTool { name: "zeta" });
    reg.register(EchoTool { name: "alpha" });
    reg.register(EchoTool { name: "mid" });
    assert_eq!(reg.list(), vec!["zeta", "alpha", "mid"]);

    // Re-registering replaces in place
    reg.register(EchoTool { name: "alpha" });
    assert_eq!(reg.list(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(reg.len(), 3);

    let names: Vec<String> = reg.get_definitions().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}

#[tokio::test]
async fn registry_remove() {
    let mut reg = ToolRegistry::new();
    reg.register(EchoTool { name: "a" });
    assert!(reg.remove("a"));
    assert!(!reg.remove("a"));
    assert!(reg.get("a").is_none());
}

#[tokio::test]
async fn registry_execute() {
    let mut reg = ToolRegistry::new();
    reg.register(EchoTool { name: "echo" });
    let r = reg.execute("echo", json!({"x": 1})).await;
    assert_eq!(r, ToolResult::Json(json!({"x": 1})));

    let missing = reg.execute("nope", json!({})).await;
    assert_eq!(missing, ToolResult::Error("Tool not found: nope".into()));
}

#[tokio::test]
async fn registry_execute_cancelled() {
    let mut reg = ToolRegistry::new();
    reg.register(SlowTool);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let r = reg.execute_cancellable("slow", json!({}), cancel).await;
    assert_eq!(r, ToolResult::text("[cancelled]"));
}

// ===========================================================================
// Policy registry
// ===========================================================================

#[test]
fn policy_registry_default_tools() {
    let reg = create_policy_registry(&ToolsConfig::default());
    assert_eq!(reg.list(), KNOWN_TOOLS.to_vec());
}

#[test]
fn policy_registry_follows_allowed_order_and_skips_unknown() {
    let config = ToolsConfig {
        allowed: vec!["get_commit".into(), "k8s_mcp_query".into(), "list_commits".into()],
        ..ToolsConfig::default()
    };
    let reg = create_policy_registry(&config);
    assert_eq!(reg.list(), vec!["get_commit", "list_commits"]);
}

#[test]
fn policy_registry_builds_cluster_tools() {
    let config = ToolsConfig {
        allowed: vec!["resources_get".into(), "get_commit".into(), "resources_list".into()],
        kubernetes_token: Some("sa-token".into()),
        ..ToolsConfig::default()
    };
    let reg = create_policy_registry(&config);
    assert_eq!(reg.list(), vec!["resources_get", "get_commit", "resources_list"]);
    let defs = reg.get_definitions();
    assert_eq!(defs[0].input_schema["required"], json!(["apiVersion", "kind", "name"]));
}

#[test]
fn policy_registry_empty_allow_list() {
    let config = ToolsConfig {
        allowed: vec![],
        ..ToolsConfig::default()
    };
    assert!(create_policy_registry(&config).is_empty());
}

// ===========================================================================
// GitHub tools
// ===========================================================================

#[test]
fn github_client_url_joining() {
    let client = GitHubClient::new("https://ghe.example.com/api/v3/", Some("t".into()));
    assert!(client.has_token());
    assert_eq!(
        client.url("/repos/o/r/commits"),
        "https://ghe.example.com/api/v3/repos/o/r/commits"
    );
}

#[test]
fn github_tool_schemas() {
    let list = ListCommitsTool::new(offline_client());
    let get = GetCommitTool::new(offline_client());
    assert_eq!(list.input_schema()["required"], json!(["owner", "repo"]));
    assert_eq!(get.input_schema()["required"], json!(["owner", "repo", "sha"]));
    assert_eq!(get.to_llm_tool().name, "get_commit");
}

#[tokio::test]
async fn github_tools_validate_arguments_before_calling() {
    let list = ListCommitsTool::new(offline_client());
    let r = list.execute(json!({"repo": "pipeline"})).await;
    assert_eq!(r, ToolResult::Error("missing required argument 'owner'".into()));

    let get = GetCommitTool::new(offline_client());
    let r = get.execute(json!({"owner": "khrm", "repo": "pipeline"})).await;
    assert_eq!(r, ToolResult::Error("missing required argument 'sha'".into()));
}

#[tokio::test]
async fn github_tools_reject_path_traversal() {
    let get = GetCommitTool::new(offline_client());
    let r = get
        .execute(json!({"owner": "khrm", "repo": "pipeline", "sha": "../../../user"}))
        .await;
    assert_eq!(
        r,
        ToolResult::Error("invalid argument 'sha': \"../../../user\"".into())
    );

    let list = ListCommitsTool::new(offline_client());
    let r = list.execute(json!({"owner": "..", "repo": "admin"})).await;
    assert_eq!(r, ToolResult::Error("invalid argument 'owner': \"..\"".into()));
}

#[test]
fn list_commits_query_defaults_to_latest_commit() {
    let q = list_commits_query(&json!({"owner": "o", "repo": "r"}));
    assert_eq!(q, vec![("per_page", "1".to_string()), ("page", "1".to_string())]);

    let q = list_commits_query(&json!({"sha": "managedBy", "perPage": 500, "page": 0}));
    assert_eq!(
        q,
        vec![
            ("sha", "managedBy".to_string()),
            ("per_page", "100".to_string()),
            ("page", "1".to_string())
        ]
    );
}

#[test]
fn summarize_commit_listing() {
    let listing = json!([{
        "sha": "abc123",
        "html_url": "https://github.com/khrm/pipeline/commit/abc123",
        "commit": {
            "message": "Fix auth token refresh",
            "author": {"name": "Dev", "date": "2026-01-02T03:04:05Z"}
        },
        "author": {"login": "dev"},
        "committer": {"login": "web-flow"}
    }]);
    let summary = summarize_commits(&listing);
    assert_eq!(
        summary,
        json!([{
            "sha": "abc123",
            "message": "Fix auth token refresh",
            "author": "Dev",
            "date": "2026-01-02T03:04:05Z",
            "url": "https://github.com/khrm/pipeline/commit/abc123"
        }])
    );
    assert_eq!(summarize_commits(&json!({"message": "Not Found"})), json!([]));
}

#[test]
fn summarize_single_commit_truncates_patches() {
    let big_patch = "+".repeat(MAX_PATCH_CHARS * 2);
    let commit = json!({
        "sha": "abc123",
        "commit": {"message": "m", "author": {"name": "Dev", "date": "d"}},
        "parents": [{"sha": "p1", "url": "u"}],
        "stats": {"additions": 3, "deletions": 1, "total": 4},
        "files": [
            {"filename": "a.go", "status": "modified", "additions": 2, "deletions": 1, "patch": "@@ -1 +1 @@\n-a\n+b"},
            {"filename": "big.txt", "status": "added", "additions": 1, "deletions": 0, "patch": big_patch},
            {"filename": "logo.png", "status": "added", "additions": 0, "deletions": 0}
        ]
    });
    let summary = summarize_commit(&commit);
    assert_eq!(summary["parents"], json!(["p1"]));
    assert_eq!(summary["stats"]["total"], 4);
    assert_eq!(summary["files"][0]["patch"], "@@ -1 +1 @@\n-a\n+b");
    let cut = summary["files"][1]["patch"].as_str().unwrap();
    assert!(cut.contains("[patch truncated"));
    assert!(cut.len() < MAX_PATCH_CHARS * 2);
    assert!(summary["files"][2]["patch"].is_null());
}

// ===========================================================================
// Kubernetes tools
// ===========================================================================

#[test]
fn kind_plurals() {
    assert_eq!(resource_plural("Pod"), "pods");
    assert_eq!(resource_plural("PipelineRun"), "pipelineruns");
    assert_eq!(resource_plural("Ingress"), "ingresses");
    assert_eq!(resource_plural("NetworkPolicy"), "networkpolicies");
    assert_eq!(resource_plural("Gateway"), "gateways");
    assert_eq!(resource_plural("Endpoints"), "endpoints");
}

#[test]
fn resource_paths_for_core_and_group_kinds() {
    assert_eq!(
        resource_path("v1", "Pod", Some("default"), None).unwrap(),
        "api/v1/namespaces/default/pods"
    );
    assert_eq!(resource_path("v1", "Node", None, None).unwrap(), "api/v1/nodes");
    assert_eq!(
        resource_path("tekton.dev/v1", "PipelineRun", Some("ci"), Some("pr-9")).unwrap(),
        "apis/tekton.dev/v1/namespaces/ci/pipelineruns/pr-9"
    );
}

#[test]
fn resource_paths_reject_unsafe_segments() {
    assert!(resource_path("v1", "Pod", Some("../kube-system"), None).is_err());
    assert!(resource_path("v1", "Secret", Some("default"), Some("..")).is_err());
    assert!(resource_path("a/b/c", "Pod", None, None).is_err());
    assert!(resource_path("v1", "pods/exec", None, None).is_err());
}

#[test]
fn list_query_defaults_and_clamps() {
    assert_eq!(list_query(&json!({})), vec![("limit", "100".to_string())]);
    assert_eq!(
        list_query(&json!({"labelSelector": "app=web", "limit": 10_000})),
        vec![("labelSelector", "app=web".to_string()), ("limit", "500".to_string())]
    );
}

#[test]
fn summarize_resource_listing() {
    let listing = json!({
        "kind": "PodList",
        "metadata": {"continue": "token"},
        "items": [
            {
                "metadata": {"name": "web-1", "namespace": "default", "creationTimestamp": "2026-01-01T00:00:00Z", "uid": "u1"},
                "spec": {"containers": []},
                "status": {"phase": "Running"}
            },
            {
                "metadata": {"name": "node-a", "creationTimestamp": "2025-12-01T00:00:00Z"},
                "status": {
                    "allocatable": {"cpu": "4", "memory": "16Gi"},
                    "conditions": [{"type": "Ready", "status": "True", "reason": "KubeletReady"}]
                }
            }
        ]
    });
    let summary = summarize_list("Pod", &listing);
    assert_eq!(
        summary,
        json!({
            "kind": "Pod",
            "count": 2,
            "more": true,
            "items": [
                {"name": "web-1", "namespace": "default", "created": "2026-01-01T00:00:00Z", "state": "Running"},
                {
                    "name": "node-a",
                    "created": "2025-12-01T00:00:00Z",
                    "state": "KubeletReady",
                    "allocatable": {"cpu": "4", "memory": "16Gi"}
                }
            ]
        })
    );
    assert_eq!(summarize_list("Pod", &json!({"kind": "Status"}))["count"], 0);
}

#[test]
fn strip_noise_drops_bookkeeping() {
    let object = json!({
        "metadata": {
            "name": "pr-9",
            "managedFields": [{"manager": "kubectl"}],
            "annotations": {
                "kubectl.kubernetes.io/last-applied-configuration": "{}",
                "team": "payments"
            }
        },
        "status": {"conditions": []}
    });
    assert_eq!(
        strip_noise(object),
        json!({
            "metadata": {"name": "pr-9", "annotations": {"team": "payments"}},
            "status": {"conditions": []}
        })
    );
}

#[tokio::test]
async fn kube_tools_validate_arguments_before_calling() {
    let list = ResourcesListTool::new(offline_kube());
    let r = list.execute(json!({"kind": "Pod"})).await;
    assert_eq!(r, ToolResult::Error("missing required argument 'apiVersion'".into()));

    let get = ResourcesGetTool::new(offline_kube());
    let r = get.execute(json!({"apiVersion": "v1", "kind": "Pod"})).await;
    assert_eq!(r, ToolResult::Error("missing required argument 'name'".into()));

    let r = get
        .execute(json!({"apiVersion": "v1", "kind": "Secret", "namespace": "default", "name": "../../nodes"}))
        .await;
    assert_eq!(r, ToolResult::Error("invalid argument 'name': \"../../nodes\"".into()));
}

#[test]
fn kube_client_url_joining() {
    let client = KubeClient::new("https://kubernetes.default.svc/", Some("t".into()));
    assert!(client.has_token());
    assert_eq!(
        client.url("/api/v1/pods"),
        "https://kubernetes.default.svc/api/v1/pods"
    );
}
