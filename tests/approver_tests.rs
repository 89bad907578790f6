//! Integration tests: file-backed store and resolver driving the full reconciliation.

use ai_approver::{DirResolver, FileTaskStore};
use approver_core::{ApproverConfig, ApproverInput, Verdict};
use approver_engine::{
    reconcile_with_store, ContextResolver, DriveOutcome, Gate, NoContext, ReplayAnalyzer,
    SkipReason, StoreError, TaskStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MARKER: &str = "ai-approver.openshift-pipelines.org/reviewed-at";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Copy the task fixture into a fresh temp dir.
fn task_file(dir: &Path) -> PathBuf {
    let path = dir.join("task.json");
    std::fs::copy(fixture("approval_task.json"), &path).unwrap();
    path
}

fn gate() -> Gate {
    Gate::new(Arc::new(ApproverConfig::default()))
}

// ===========================================================================
// FileTaskStore
// ===========================================================================

#[tokio::test]
async fn store_get_checks_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTaskStore::new(task_file(dir.path()));

    let task = store.get("ci", "pr-9-approval").await.unwrap();
    assert_eq!(task.resource_version(), Some("7"));

    assert!(matches!(
        store.get("ci", "other").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.get("prod", "pr-9-approval").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn store_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTaskStore::new(dir.path().join("absent.json"));
    assert!(matches!(store.load().await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn store_rejects_stale_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileTaskStore::new(task_file(dir.path()));
    let task = store.get("ci", "pr-9-approval").await.unwrap();

    let outcome = gate()
        .reconcile(&task, &NoContext, &ReplayAnalyzer::new("Decision: approve"))
        .await;
    let patch = outcome.patch().unwrap();

    let err = store
        .apply_patch("ci", "pr-9-approval", Some("6"), patch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref actual, .. } if actual.as_deref() == Some("7")));

    let written = store
        .apply_patch("ci", "pr-9-approval", Some("7"), patch)
        .await
        .unwrap();
    assert_eq!(written.resource_version(), Some("8"));
}

// ===========================================================================
// DirResolver
// ===========================================================================

#[tokio::test]
async fn dir_resolver_prefers_namespaced_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("ci")).unwrap();
    std::fs::copy(fixture("pr-9.json"), dir.path().join("ci/pr-9.json")).unwrap();
    std::fs::write(
        dir.path().join("pr-9.json"),
        r#"{"spec": {"pipelineSpec": {"tasks": []}}}"#,
    )
    .unwrap();

    let resolver = DirResolver::new(dir.path());
    let spec = resolver
        .resolve_pipeline_run("pr-9", "ci")
        .await
        .unwrap()
        .unwrap();
    let info = spec.git_info().unwrap();
    assert_eq!((info.owner.as_str(), info.repo.as_str()), ("khrm", "pipeline"));
    assert_eq!(info.revision.as_deref(), Some("managedBy"));

    // Other namespaces fall back to the flat file
    let flat = resolver
        .resolve_pipeline_run("pr-9", "staging")
        .await
        .unwrap()
        .unwrap();
    assert!(flat.git_info().is_none());
}

#[tokio::test]
async fn dir_resolver_unknown_run_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = DirResolver::new(dir.path());
    assert!(resolver
        .resolve_pipeline_run("missing", "ci")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn dir_resolver_reports_malformed_documents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
    let resolver = DirResolver::new(dir.path());
    assert!(resolver.resolve_pipeline_run("broken", "ci").await.is_err());
}

// ===========================================================================
// End to end
// ===========================================================================

#[tokio::test]
async fn reconcile_writes_decision_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = task_file(dir.path());
    let store = FileTaskStore::new(&path);
    let analyzer = ReplayAnalyzer::new(
        "Thought: diff looks safe\nDecision: approve\n\n**Reasoning:** tightens token validation",
    );

    let outcome = reconcile_with_store(
        &gate(),
        &store,
        "ci",
        "pr-9-approval",
        &NoContext,
        &analyzer,
    )
    .await
    .unwrap();
    let decision = match outcome {
        DriveOutcome::Applied { decision, .. } => decision,
        other => panic!("expected a write, got {:?}", other),
    };
    assert_eq!(decision.verdict, Verdict::Approve);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["metadata"]["resourceVersion"], "8");
    assert_eq!(raw["metadata"]["annotations"]["team"], "payments");
    assert!(raw["metadata"]["annotations"][MARKER].is_string());
    assert_eq!(raw["spec"]["numberOfApprovalsRequired"], 2);
    assert_eq!(raw["status"]["state"], "pending");
    assert_eq!(raw["spec"]["approvers"][0]["input"], "pending");
    assert_eq!(raw["spec"]["approvers"][1]["input"], "approve");
    assert_eq!(raw["spec"]["approvers"][1]["type"], "User");
    assert_eq!(
        raw["spec"]["approvers"][1]["message"],
        "approve\n\n**Reasoning:** tightens token validation"
    );

    // Second pass sees the marker
    let again = reconcile_with_store(
        &gate(),
        &store,
        "ci",
        "pr-9-approval",
        &NoContext,
        &analyzer,
    )
    .await
    .unwrap();
    assert!(matches!(again, DriveOutcome::Skipped(SkipReason::AlreadyReviewed { .. })));
    let task = store.load().await.unwrap();
    assert_eq!(task.resource_version(), Some("8"));
    assert_eq!(task.spec.approvers[1].input(), Some(ApproverInput::Approve));
}

#[tokio::test]
async fn reconcile_with_pipeline_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = task_file(dir.path());
    let runs = dir.path().join("runs");
    std::fs::create_dir_all(&runs).unwrap();
    std::fs::copy(fixture("pr-9.json"), runs.join("pr-9.json")).unwrap();

    let store = FileTaskStore::new(&path);
    let task = store.load().await.unwrap();
    let request = gate()
        .compile_request(&task, &DirResolver::new(&runs), vec!["get_commit".into()])
        .await
        .unwrap();
    assert!(request.as_str().contains("Repository: khrm/pipeline"));
    assert!(request.as_str().contains("Git URL: git@github.com:khrm/pipeline.git"));
    assert!(request.as_str().contains("This involves security changes."));
}
