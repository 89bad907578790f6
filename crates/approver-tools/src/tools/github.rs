//! GitHub REST tools: list_commits, get_commit
//!
//! Responses are reduced to what a review needs. Patches are cut at
//! [`MAX_PATCH_CHARS`] per file so one large diff cannot crowd out the rest.

use super::{int_arg, is_path_segment, str_arg};
use crate::registry::{Tool, ToolResult};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MAX_PATCH_CHARS: usize = 4000;
const DEFAULT_PER_PAGE: u64 = 1;
const MAX_PER_PAGE: u64 = 100;
const USER_AGENT: &str = concat!("ai-approver/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {value:?}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("GitHub API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Shared HTTP client for the GitHub tools.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GitHubError> {
        let url = self.url(path);
        debug!("GitHub GET {} {:?}", url, query);

        let mut req = self
            .client
            .get(&url)
            .query(query)
            .header("accept", "application/vnd.github+json")
            .header("user-agent", USER_AGENT)
            .header("x-github-api-version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GitHub API {} for {}", status, url);
            return Err(GitHubError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// Owner and repo of a call, validated.
fn repo_args(args: &Value) -> Result<(String, String), GitHubError> {
    let owner = segment_arg(args, "owner", &["owner"])?;
    let repo = segment_arg(args, "repo", &["repo"])?;
    Ok((owner, repo))
}

/// Required argument that lands in the URL path.
fn segment_arg(args: &Value, name: &'static str, keys: &[&str]) -> Result<String, GitHubError> {
    let value = str_arg(args, keys).ok_or(GitHubError::MissingArgument(name))?;
    if !is_path_segment(&value) {
        return Err(GitHubError::InvalidArgument { name, value });
    }
    Ok(value)
}

/// Query parameters for the commit listing.
pub fn list_commits_query(args: &Value) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(sha) = str_arg(args, &["sha"]) {
        query.push(("sha", sha));
    }
    let per_page = int_arg(args, &["per_page", "perPage"])
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    query.push(("per_page", per_page.to_string()));
    query.push(("page", int_arg(args, &["page"]).unwrap_or(1).max(1).to_string()));
    query
}

fn commit_header(commit: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("sha".into(), commit["sha"].clone());
    out.insert("message".into(), commit["commit"]["message"].clone());
    out.insert("author".into(), commit["commit"]["author"]["name"].clone());
    out.insert("date".into(), commit["commit"]["author"]["date"].clone());
    out.insert("url".into(), commit["html_url"].clone());
    out
}

/// Reduce a commit listing to sha, message, author, date, url.
pub fn summarize_commits(listing: &Value) -> Value {
    let commits = listing
        .as_array()
        .map(|a| a.iter().map(|c| Value::Object(commit_header(c))).collect())
        .unwrap_or_default();
    Value::Array(commits)
}

/// Reduce a single commit to its header, stats and per-file patches.
pub fn summarize_commit(commit: &Value) -> Value {
    let mut out = commit_header(commit);
    out.insert("parents".into(), json!(commit["parents"]
        .as_array()
        .map(|ps| ps.iter().map(|p| p["sha"].clone()).collect::<Vec<_>>())
        .unwrap_or_default()));
    out.insert("stats".into(), commit["stats"].clone());

    let files: Vec<Value> = commit["files"]
        .as_array()
        .map(|files| {
            files
                .iter()
                .map(|f| {
                    json!({
                        "filename": f["filename"],
                        "status": f["status"],
                        "additions": f["additions"],
                        "deletions": f["deletions"],
                        "patch": f["patch"].as_str().map(truncate_patch),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    out.insert("files".into(), Value::Array(files));
    Value::Object(out)
}

fn truncate_patch(patch: &str) -> String {
    let total = patch.chars().count();
    if total <= MAX_PATCH_CHARS {
        return patch.to_string();
    }
    let head: String = patch.chars().take(MAX_PATCH_CHARS).collect();
    format!("{}\n[patch truncated, {} total chars]", head, total)
}

fn to_result(outcome: Result<Value, GitHubError>) -> ToolResult {
    match outcome {
        Ok(v) => ToolResult::Json(v),
        Err(e) => ToolResult::Error(e.to_string()),
    }
}

// ---------------------------------------------------------------------------

pub struct ListCommitsTool {
    client: Arc<GitHubClient>,
}

impl ListCommitsTool {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }

    async fn run(&self, args: &Value) -> Result<Value, GitHubError> {
        let (owner, repo) = repo_args(args)?;
        let listing = self
            .client
            .get_json(
                &format!("repos/{}/{}/commits", owner, repo),
                &list_commits_query(args),
            )
            .await?;
        Ok(summarize_commits(&listing))
    }
}

#[async_trait::async_trait]
impl Tool for ListCommitsTool {
    fn name(&self) -> &str {
        "list_commits"
    }

    fn description(&self) -> &str {
        "List commits of a GitHub repository, newest first. Defaults to one commit \
         (the latest) on the given branch or revision."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {"type": "string", "description": "Repository owner"},
                "repo": {"type": "string", "description": "Repository name"},
                "sha": {"type": "string", "description": "Branch, tag or commit SHA to list from"},
                "page": {"type": "integer", "description": "Page number (default 1)"},
                "per_page": {"type": "integer", "description": "Results per page (default 1, max 100)"}
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        to_result(self.run(&args).await)
    }
}

pub struct GetCommitTool {
    client: Arc<GitHubClient>,
}

impl GetCommitTool {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }

    async fn run(&self, args: &Value) -> Result<Value, GitHubError> {
        let (owner, repo) = repo_args(args)?;
        let sha = segment_arg(args, "sha", &["sha", "ref"])?;
        let commit = self
            .client
            .get_json(&format!("repos/{}/{}/commits/{}", owner, repo, sha), &[])
            .await?;
        Ok(summarize_commit(&commit))
    }
}

#[async_trait::async_trait]
impl Tool for GetCommitTool {
    fn name(&self) -> &str {
        "get_commit"
    }

    fn description(&self) -> &str {
        "Get one commit of a GitHub repository with its changed files and diff."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": {"type": "string", "description": "Repository owner"},
                "repo": {"type": "string", "description": "Repository name"},
                "sha": {"type": "string", "description": "Commit SHA, branch or tag"}
            },
            "required": ["owner", "repo", "sha"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        to_result(self.run(&args).await)
    }
}
