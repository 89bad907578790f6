//! Tests for approver-core: resource model, patch merging, pipeline facts, config

use approver_core::pipeline::parse_git_url;
use approver_core::*;
use serde_json::json;

fn sample_task() -> ApprovalTask {
    ApprovalTask::from_json(
        &json!({
            "apiVersion": "openshift-pipelines.org/v1alpha1",
            "kind": "ApprovalTask",
            "metadata": {
                "name": "pr-123-approve",
                "namespace": "ci",
                "resourceVersion": "7",
                "labels": {
                    "tekton.dev/pipelineRun": "pr-123",
                    "tekton.dev/pipeline": "build-and-deploy"
                },
                "uid": "abc"
            },
            "spec": {
                "description": "Security patch for login",
                "approvers": [
                    {"name": "alice", "input": "pending", "type": "User"},
                    {"name": "kubernetes-admin", "input": ""},
                    {"name": "bob"}
                ],
                "numberOfApprovalsRequired": 2
            },
            "status": {"state": "pending"}
        })
        .to_string(),
    )
    .unwrap()
}

// ===========================================================================
// ApprovalTask
// ===========================================================================

#[test]
fn task_identity_and_labels() {
    let task = sample_task();
    assert_eq!(task.name(), "pr-123-approve");
    assert_eq!(task.namespace(), "ci");
    assert_eq!(task.key(), "ci/pr-123-approve");
    assert_eq!(task.label("tekton.dev/pipelineRun"), Some("pr-123"));
    assert_eq!(task.resource_version(), Some("7"));
    assert!(task.annotation("missing").is_none());
}

#[test]
fn task_key_without_namespace() {
    let task = ApprovalTask::from_json(r#"{"metadata":{"name":"solo"}}"#).unwrap();
    assert_eq!(task.key(), "solo");
    assert!(task.spec.approvers.is_empty());
    assert_eq!(task.spec.description, "");
}

#[test]
fn task_without_name_is_rejected() {
    let err = ApprovalTask::from_json(r#"{"metadata":{}}"#).unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
}

#[test]
fn approver_input_variants() {
    let task = sample_task();
    let approvers = &task.spec.approvers;
    assert_eq!(approvers[0].input(), Some(ApproverInput::Pending));
    assert!(approvers[0].is_undecided());
    // Empty string is the same as absent
    assert_eq!(approvers[1].input(), None);
    assert!(approvers[1].is_undecided());
    assert_eq!(approvers[2].input(), None);

    let decided = Approver::new("x").with_input("approve");
    assert!(!decided.is_undecided());
    let other = Approver::new("y").with_input("lgtm");
    assert_eq!(other.input(), Some(ApproverInput::Other("lgtm".into())));
    assert!(!other.is_undecided());

    let noted = Approver::new("z").with_input("pending").with_message("later");
    assert!(noted.is_undecided());
    assert_eq!(noted.message(), Some("later"));
}

#[test]
fn approver_fields_round_trip_verbatim() {
    let raw = json!([
        {"name": "alice", "input": "", "message": null},
        {"name": "bob", "input": null, "type": "User"},
        {"name": "carol", "input": 3}
    ]);
    let approvers: Vec<Approver> = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(approvers[0].input(), None);
    assert_eq!(approvers[0].message(), None);
    assert_eq!(approvers[1].input(), None);
    assert_eq!(approvers[2].input(), Some(ApproverInput::Other("3".into())));
    assert!(!approvers[2].is_undecided());

    assert_eq!(serde_json::to_value(&approvers).unwrap(), raw);
}

#[test]
fn approver_index_is_first_match() {
    let task = sample_task();
    assert_eq!(task.approver_index("kubernetes-admin"), Some(1));
    assert_eq!(task.approver_index("nobody"), None);
}

#[test]
fn unknown_fields_survive_serialization() {
    let task = sample_task();
    let value = serde_json::to_value(&task).unwrap();
    assert_eq!(value["metadata"]["uid"], "abc");
    assert_eq!(value["spec"]["numberOfApprovalsRequired"], 2);
    assert_eq!(value["status"]["state"], "pending");
    assert_eq!(value["spec"]["approvers"][0]["type"], "User");
    // Absent input stays absent
    assert!(value["spec"]["approvers"][1].get("input").is_none());
}

// ===========================================================================
// Verdict / ReviewDecision / AnalysisRequest
// ===========================================================================

#[test]
fn verdict_serde_lowercase() {
    assert_eq!(serde_json::to_string(&Verdict::Approve).unwrap(), r#""approve""#);
    let v: Verdict = serde_json::from_str(r#""reject""#).unwrap();
    assert_eq!(v, Verdict::Reject);
    assert_eq!(ApproverInput::from(Verdict::Reject), ApproverInput::Reject);
}

#[test]
fn fail_safe_decision_is_reject_with_cause() {
    let d = ReviewDecision::fail_safe("connection refused");
    assert_eq!(d.verdict, Verdict::Reject);
    assert_eq!(d.message, "Error in analysis: connection refused");
}

#[test]
fn analysis_request_is_opaque_string() {
    let r = AnalysisRequest::new("hello");
    assert_eq!(r.as_str(), "hello");
    assert_eq!(format!("{}", r), "hello");
    assert_eq!(r.into_string(), "hello");
}

// ===========================================================================
// ApprovalPatch
// ===========================================================================

#[test]
fn patch_serializes_as_merge_patch() {
    let approvers = vec![Approver::new("kubernetes-admin").with_input(Verdict::Approve)];
    let patch = ApprovalPatch::new("reviewed-at", "2026-01-01T00:00:00.000000+00:00", approvers);
    let value: serde_json::Value = serde_json::from_str(&patch.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "metadata": {"annotations": {"reviewed-at": "2026-01-01T00:00:00.000000+00:00"}},
            "spec": {"approvers": [{"name": "kubernetes-admin", "input": "approve"}]}
        })
    );
}

#[test]
fn patch_apply_merges_annotations_and_replaces_approvers() {
    let mut task = sample_task();
    task.metadata
        .annotations
        .insert("keep".into(), "me".into());
    let mut approvers = task.spec.approvers.clone();
    approvers[1].set_input(ApproverInput::Reject);
    approvers[1].set_message("no");
    let patch = ApprovalPatch::new("marker", "ts", approvers);

    patch.apply_to(&mut task);
    assert_eq!(task.annotation("keep"), Some("me"));
    assert_eq!(task.annotation("marker"), Some("ts"));
    assert_eq!(task.spec.approvers[1].input(), Some(ApproverInput::Reject));
    assert_eq!(task.spec.approvers[0].extra.get("type"), Some(&json!("User")));
    assert_eq!(patch.approver("kubernetes-admin").unwrap().message(), Some("no"));
}

// ===========================================================================
// PipelineSpec / GitInfo
// ===========================================================================

fn pipeline_run(url: &str) -> serde_json::Value {
    json!({
        "apiVersion": "tekton.dev/v1",
        "kind": "PipelineRun",
        "metadata": {"name": "pr-123"},
        "spec": {
            "pipelineSpec": {
                "tasks": [
                    {"name": "lint", "taskRef": {"name": "golangci-lint"}},
                    {
                        "name": "fetch",
                        "taskRef": {"name": "git-clone"},
                        "params": [
                            {"name": "url", "value": url},
                            {"name": "revision", "value": "main"}
                        ]
                    }
                ]
            }
        }
    })
}

#[test]
fn git_info_from_pipeline_run() {
    let spec = PipelineSpec::from_pipeline_run(&pipeline_run("https://github.com/khrm/pipeline")).unwrap();
    let info = spec.git_info().unwrap();
    assert_eq!(info.owner, "khrm");
    assert_eq!(info.repo, "pipeline");
    assert_eq!(info.revision.as_deref(), Some("main"));
    assert_eq!(info.url, "https://github.com/khrm/pipeline");
}

#[test]
fn pipeline_spec_from_status() {
    let run = json!({"status": {"pipelineSpec": {"tasks": []}}});
    let spec = PipelineSpec::from_pipeline_run(&run).unwrap();
    assert!(spec.tasks.is_empty());
    assert!(spec.git_info().is_none());
    assert!(PipelineSpec::from_pipeline_run(&json!({"spec": {}})).is_none());
}

#[test]
fn git_url_shapes() {
    assert_eq!(
        parse_git_url("https://github.com/khrm/pipeline.git"),
        ("khrm".to_string(), "pipeline".to_string())
    );
    assert_eq!(
        parse_git_url("https://github.com/tektoncd/cli/"),
        ("tektoncd".to_string(), "cli".to_string())
    );
    assert_eq!(
        parse_git_url("git@github.com:khrm/pipeline.git"),
        ("khrm".to_string(), "pipeline".to_string())
    );
    assert_eq!(
        parse_git_url("https://gitlab.com/a/b"),
        ("unknown".to_string(), "unknown".to_string())
    );
}

// ===========================================================================
// ApproverConfig
// ===========================================================================

#[test]
fn config_defaults() {
    let config = ApproverConfig::default();
    assert_eq!(config.approver.name, "kubernetes-admin");
    assert_eq!(
        config.approver.reviewed_annotation,
        "ai-approver.openshift-pipelines.org/reviewed-at"
    );
    assert_eq!(config.pipeline_run_label(), "tekton.dev/pipelineRun");
    assert_eq!(config.pipeline_label(), "tekton.dev/pipeline");
    assert_eq!(config.prompt.rules.len(), 6);
    assert_eq!(config.prompt.considerations.len(), 12);
    assert!(config.prompt.base_template.contains("{tool_list}"));
    assert_eq!(
        config.tools.allowed,
        vec!["list_commits", "get_commit", "resources_list", "resources_get"]
    );
    assert_eq!(config.tools.kubernetes_api_url, "https://kubernetes.default.svc");
    assert!(config.prompt.base_template.contains("resources_list"));
    assert!(config
        .prompt
        .missing_context_notice
        .contains("NO PIPELINE SPEC AVAILABLE"));
}

#[test]
fn config_partial_toml_keeps_defaults() {
    let config = ApproverConfig::from_toml_str(
        r#"
[approver]
name = "ai-bot"

[prompt]
base_prompt = "Review {pipeline_name}"
considerations = ["Tests"]

[[prompt.rules]]
field = "description"
contains = "security"
instruction = "Look closer."
"#,
    )
    .unwrap();
    assert_eq!(config.approver.name, "ai-bot");
    assert_eq!(config.approver.label_prefix, "tekton.dev/");
    assert_eq!(config.prompt.base_template, "Review {pipeline_name}");
    assert_eq!(config.prompt.rules, vec![PromptRule::new("description", "security", "Look closer.")]);
    assert_eq!(config.model.max_tool_iterations, 10);
}

#[test]
fn config_rejects_empty_identity() {
    let err = ApproverConfig::from_toml_str("[approver]\nname = \"\"\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn config_load_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = ApproverConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.approver.name, "kubernetes-admin");
}

#[test]
fn config_load_malformed_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[approver\nname = 1").unwrap();
    assert!(matches!(ApproverConfig::load(&path), Err(Error::TomlError(_))));
}

#[test]
fn config_env_overlay_and_secret_skipping() {
    let mut config = ApproverConfig::default();
    config.apply_env_from(|key| match key {
        "MODEL_NAME" => Some("gpt-4o".into()),
        "API_KEY" => Some("sk-secret".into()),
        "GITHUB_PERSONAL_ACCESS_TOKEN" => Some(String::new()),
        "KUBERNETES_TOKEN" => Some("sa-secret".into()),
        _ => None,
    });
    assert_eq!(config.tools.kubernetes_token.as_deref(), Some("sa-secret"));
    assert_eq!(config.model.name, "gpt-4o");
    assert_eq!(config.model.api_key.as_deref(), Some("sk-secret"));
    assert!(config.tools.github_token.is_none());

    let rendered = config.to_toml().unwrap();
    assert!(rendered.contains("gpt-4o"));
    assert!(!rendered.contains("sk-secret"));
    assert!(!rendered.contains("sa-secret"));
    let back = ApproverConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(back.prompt, config.prompt);
}

#[test]
fn config_serialization_error_is_reported() {
    let err: Error = <toml::ser::Error as serde::ser::Error>::custom("unsupported value").into();
    assert!(matches!(err, Error::TomlSerError(_)));
    assert!(err.to_string().contains("unsupported value"));

    let rendered = ApproverConfig::default().to_toml().unwrap();
    assert!(rendered.contains("[prompt]"));
    assert!(rendered.contains("missing_context_notice"));
}
