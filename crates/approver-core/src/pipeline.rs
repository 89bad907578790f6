//! Resolved pipeline specification and the git facts derived from it

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::types::Extra;

/// Task reference name of the clone step whose params identify the repository.
pub const GIT_CLONE_TASK: &str = "git-clone";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSpec {
    #[serde(default)]
    pub tasks: Vec<PipelineTask>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTask {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Param {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Repository coordinates of the change under review.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitInfo {
    pub url: String,
    pub owner: String,
    pub repo: String,
    pub revision: Option<String>,
}

impl PipelineSpec {
    /// Extract the embedded pipeline spec from a PipelineRun document.
    /// Looks at `spec.pipelineSpec` first, then `status.pipelineSpec`.
    pub fn from_pipeline_run(run: &serde_json::Value) -> Option<Self> {
        ["/spec/pipelineSpec", "/status/pipelineSpec"]
            .iter()
            .filter_map(|ptr| run.pointer(ptr))
            .find_map(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Repository facts from the first `git-clone` task, if any.
    pub fn git_info(&self) -> Option<GitInfo> {
        let task = self.tasks.iter().find(|t| {
            t.task_ref
                .as_ref()
                .is_some_and(|r| r.name == GIT_CLONE_TASK)
        })?;

        let param = |name: &str| {
            task.params
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.as_str())
                .map(str::to_string)
        };

        let url = param("url")?;
        let (owner, repo) = parse_git_url(&url);
        Some(GitInfo {
            owner,
            repo,
            revision: param("revision"),
            url,
        })
    }
}

/// Split a GitHub HTTPS or SSH clone URL into `(owner, repo)`.
/// Returns `("unknown", "unknown")` when the URL has neither shape.
pub fn parse_git_url(url: &str) -> (String, String) {
    static HTTPS: OnceLock<Regex> = OnceLock::new();
    static SSH: OnceLock<Regex> = OnceLock::new();

    let https = HTTPS.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/]+)/([^/]+?)(?:\.git)?/?$").expect("valid regex")
    });
    let ssh = SSH.get_or_init(|| {
        Regex::new(r"^git@github\.com:([^/]+)/([^/]+?)(?:\.git)?/?$").expect("valid regex")
    });

    for re in [https, ssh] {
        if let Some(caps) = re.captures(url) {
            return (caps[1].to_string(), caps[2].to_string());
        }
    }

    warn!("Could not parse git URL: {}", url);
    ("unknown".to_string(), "unknown".to_string())
}
