//! Kubernetes API tools: resources_list, resources_get
//!
//! Lets the analyzer gauge cluster load before approving: PipelineRun and
//! Pod counts, node capacity, or a single object. Listings are reduced to
//! name, namespace, age and state per item.

use super::{int_arg, is_path_segment, str_arg};
use crate::registry::{Tool, ToolResult};
use reqwest::{Certificate, Client, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 500;
const LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

#[derive(Debug, thiserror::Error)]
pub enum KubeError {
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {value:?}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Kubernetes API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Shared HTTP client for the cluster tools.
pub struct KubeClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), api_url, token)
    }

    /// Client that also trusts the given PEM bundle (the cluster CA).
    pub fn with_ca_pem(
        api_url: impl Into<String>,
        token: Option<String>,
        pem: &[u8],
    ) -> Result<Self, KubeError> {
        let client = Client::builder()
            .add_root_certificate(Certificate::from_pem(pem)?)
            .build()?;
        Ok(Self::with_client(client, api_url, token))
    }

    fn with_client(client: Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
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

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, KubeError> {
        let url = self.url(path);
        debug!("Kubernetes GET {} {:?}", url, query);

        let mut req = self
            .client
            .get(&url)
            .query(query)
            .header("accept", "application/json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Kubernetes API {} for {}", status, url);
            return Err(KubeError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// Lower-case plural resource name for a kind: `PipelineRun` -> `pipelineruns`.
pub fn resource_plural(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if lower == "endpoints" {
        return lower;
    }
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{}es", lower);
    }
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.ends_with(|c: char| "aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", lower)
}

/// REST path for a resource collection or, with `name`, a single object.
///
/// `v1` maps to the core group (`api/v1`); `group/version` to `apis/...`.
pub fn resource_path(
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: Option<&str>,
) -> Result<String, KubeError> {
    let invalid = |name: &'static str, value: &str| KubeError::InvalidArgument {
        name,
        value: value.to_string(),
    };

    let mut path = match api_version.split_once('/') {
        None if is_path_segment(api_version) => format!("api/{}", api_version),
        Some((group, version)) if is_path_segment(group) && is_path_segment(version) => {
            format!("apis/{}/{}", group, version)
        }
        _ => return Err(invalid("apiVersion", api_version)),
    };
    if !is_path_segment(kind) {
        return Err(invalid("kind", kind));
    }
    if let Some(ns) = namespace {
        if !is_path_segment(ns) {
            return Err(invalid("namespace", ns));
        }
        path.push_str(&format!("/namespaces/{}", ns));
    }
    path.push('/');
    path.push_str(&resource_plural(kind));
    if let Some(name) = name {
        if !is_path_segment(name) {
            return Err(invalid("name", name));
        }
        path.push('/');
        path.push_str(name);
    }
    Ok(path)
}

/// `apiVersion` and `kind` of a call, both required.
fn type_args(args: &Value) -> Result<(String, String), KubeError> {
    let api_version = str_arg(args, &["apiVersion", "api_version"])
        .ok_or(KubeError::MissingArgument("apiVersion"))?;
    let kind = str_arg(args, &["kind"]).ok_or(KubeError::MissingArgument("kind"))?;
    Ok((api_version, kind))
}

/// Query parameters for a listing.
pub fn list_query(args: &Value) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(selector) = str_arg(args, &["labelSelector", "label_selector"]) {
        query.push(("labelSelector", selector));
    }
    let limit = int_arg(args, &["limit"])
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);
    query.push(("limit", limit.to_string()));
    query
}

/// Phase if the object has one, else the reason of its Succeeded/Ready condition.
fn item_state(item: &Value) -> Option<String> {
    let status = &item["status"];
    if let Some(phase) = status["phase"].as_str() {
        return Some(phase.to_string());
    }
    let condition = status["conditions"]
        .as_array()?
        .iter()
        .find(|c| matches!(c["type"].as_str(), Some("Succeeded") | Some("Ready")))?;
    condition["reason"]
        .as_str()
        .or_else(|| condition["status"].as_str())
        .map(str::to_string)
}

fn summarize_item(item: &Value) -> Value {
    let meta = &item["metadata"];
    let mut out = Map::new();
    out.insert("name".into(), meta["name"].clone());
    if let Some(ns) = meta["namespace"].as_str() {
        out.insert("namespace".into(), json!(ns));
    }
    out.insert("created".into(), meta["creationTimestamp"].clone());
    if let Some(state) = item_state(item) {
        out.insert("state".into(), json!(state));
    }
    if let Some(allocatable) = item["status"].get("allocatable") {
        out.insert("allocatable".into(), allocatable.clone());
    }
    Value::Object(out)
}

/// Reduce a listing to its count and one short entry per item.
pub fn summarize_list(kind: &str, listing: &Value) -> Value {
    let items: Vec<Value> = listing["items"]
        .as_array()
        .map(|items| items.iter().map(summarize_item).collect())
        .unwrap_or_default();
    let more = listing["metadata"]["continue"]
        .as_str()
        .map_or(false, |c| !c.is_empty());
    json!({
        "kind": kind,
        "count": items.len(),
        "more": more,
        "items": items,
    })
}

/// Drop server bookkeeping that only adds noise for a reviewer.
pub fn strip_noise(mut object: Value) -> Value {
    if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
        if let Some(annotations) = meta.get_mut("annotations").and_then(Value::as_object_mut) {
            annotations.remove(LAST_APPLIED);
        }
    }
    object
}

fn to_result(outcome: Result<Value, KubeError>) -> ToolResult {
    match outcome {
        Ok(v) => ToolResult::Json(v),
        Err(e) => ToolResult::Error(e.to_string()),
    }
}

// ---------------------------------------------------------------------------

pub struct ResourcesListTool {
    client: Arc<KubeClient>,
}

impl ResourcesListTool {
    pub fn new(client: Arc<KubeClient>) -> Self {
        Self { client }
    }

    async fn run(&self, args: &Value) -> Result<Value, KubeError> {
        let (api_version, kind) = type_args(args)?;
        let namespace = str_arg(args, &["namespace"]);
        let path = resource_path(&api_version, &kind, namespace.as_deref(), None)?;
        let listing = self.client.get_json(&path, &list_query(args)).await?;
        Ok(summarize_list(&kind, &listing))
    }
}

#[async_trait::async_trait]
impl Tool for ResourcesListTool {
    fn name(&self) -> &str {
        "resources_list"
    }

    fn description(&self) -> &str {
        "List Kubernetes resources of one kind, optionally in one namespace. Returns the \
         count plus name, namespace, creation time and state of each item."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "apiVersion": {"type": "string", "description": "e.g. \"v1\" or \"tekton.dev/v1\""},
                "kind": {"type": "string", "description": "e.g. \"Pod\", \"PipelineRun\", \"Node\""},
                "namespace": {"type": "string", "description": "Namespace; omit for all namespaces or cluster-scoped kinds"},
                "labelSelector": {"type": "string", "description": "Label selector, e.g. \"app=web\""},
                "limit": {"type": "integer", "description": "Maximum items (default 100, max 500)"}
            },
            "required": ["apiVersion", "kind"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        to_result(self.run(&args).await)
    }
}

pub struct ResourcesGetTool {
    client: Arc<KubeClient>,
}

impl ResourcesGetTool {
    pub fn new(client: Arc<KubeClient>) -> Self {
        Self { client }
    }

    async fn run(&self, args: &Value) -> Result<Value, KubeError> {
        let (api_version, kind) = type_args(args)?;
        let name = str_arg(args, &["name"]).ok_or(KubeError::MissingArgument("name"))?;
        let namespace = str_arg(args, &["namespace"]);
        let path = resource_path(&api_version, &kind, namespace.as_deref(), Some(name.as_str()))?;
        let object = self.client.get_json(&path, &[]).await?;
        Ok(strip_noise(object))
    }
}

#[async_trait::async_trait]
impl Tool for ResourcesGetTool {
    fn name(&self) -> &str {
        "resources_get"
    }

    fn description(&self) -> &str {
        "Get one Kubernetes resource by kind and name, e.g. a PipelineRun with its status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "apiVersion": {"type": "string", "description": "e.g. \"v1\" or \"tekton.dev/v1\""},
                "kind": {"type": "string", "description": "e.g. \"PipelineRun\""},
                "name": {"type": "string", "description": "Object name"},
                "namespace": {"type": "string", "description": "Namespace; omit for cluster-scoped kinds"}
            },
            "required": ["apiVersion", "kind", "name"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        to_result(self.run(&args).await)
    }
}
