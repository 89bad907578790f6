//! Approver configuration
//!
//! Built once at startup and passed by reference into the gate. Loaded from
//! TOML, falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Top-level approver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproverConfig {
    /// Identity and bookkeeping keys on the ApprovalTask.
    pub approver: ApproverIdentity,
    /// Model selection for the LLM analyzer.
    pub model: ModelConfig,
    /// Capabilities offered to the model.
    pub tools: ToolsConfig,
    /// Prompt template, rules and considerations.
    pub prompt: PromptPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproverIdentity {
    /// Name of the approvers entry this process answers for.
    pub name: String,
    /// Annotation whose presence marks the task as reviewed.
    pub reviewed_annotation: String,
    /// Prefix of the pipeline labels (`<prefix>pipelineRun`, `<prefix>pipeline`).
    pub label_prefix: String,
    /// Upper bound on a single analysis call, in seconds.
    pub analysis_timeout_secs: u64,
    /// How many times a conflicting write restarts the reconciliation.
    pub max_conflict_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier (e.g. "claude-sonnet-4-5").
    pub name: String,
    /// API key. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override for the provider endpoint.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// Tool-use round trips allowed per analysis.
    pub max_tool_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool names registered for the analyzer, in advertised order.
    pub allowed: Vec<String>,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// API server for the cluster tools. Service-account credentials are
    /// picked up when running in a pod.
    pub kubernetes_api_url: String,
    #[serde(skip_serializing)]
    pub kubernetes_token: Option<String>,
    /// PEM bundle trusted for the API server, added to the system roots.
    pub kubernetes_ca_file: Option<String>,
}

/// Policy driving prompt compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptPolicy {
    /// Template with `{pipeline_run_name}`, `{pipeline_name}`, `{description}`
    /// and `{tool_list}` placeholders. `{{` and `}}` are literal braces.
    #[serde(alias = "base_prompt")]
    pub base_template: String,
    pub rules: Vec<PromptRule>,
    pub considerations: Vec<String>,
    pub output_format_instruction: String,
    /// Appended instead of the repository section when no repository facts
    /// could be resolved. Same placeholders as the template; empty disables it.
    pub missing_context_notice: String,
}

/// Adds `instruction` when `field` contains `contains` (case-insensitive).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptRule {
    pub field: String,
    pub contains: String,
    pub instruction: String,
}

impl PromptRule {
    pub fn new(
        field: impl Into<String>,
        contains: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            contains: contains.into(),
            instruction: instruction.into(),
        }
    }
}

// ============================================================
// Defaults
// ============================================================

impl Default for ApproverIdentity {
    fn default() -> Self {
        Self {
            name: "kubernetes-admin".into(),
            reviewed_annotation: "ai-approver.openshift-pipelines.org/reviewed-at".into(),
            label_prefix: "tekton.dev/".into(),
            analysis_timeout_secs: 600,
            max_conflict_retries: 3,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "claude-sonnet-4-5".into(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            max_tool_iterations: 10,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed: vec![
                "list_commits".into(),
                "get_commit".into(),
                "resources_list".into(),
                "resources_get".into(),
            ],
            github_token: None,
            github_api_url: "https://api.github.com".into(),
            kubernetes_api_url: "https://kubernetes.default.svc".into(),
            kubernetes_token: None,
            kubernetes_ca_file: None,
        }
    }
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self {
            base_template: DEFAULT_BASE_TEMPLATE.into(),
            rules: vec![
                PromptRule::new(
                    "description",
                    "security",
                    "This involves security changes. Perform extra scrutiny for potential \
                     vulnerabilities and security best practices.",
                ),
                PromptRule::new(
                    "pipeline_name",
                    "production",
                    "This is a production pipeline. Be extra careful and scrutinize code quality, \
                     security, and potential impact on stability.",
                ),
                PromptRule::new(
                    "description",
                    "critical",
                    "The description mentions this is a critical task. Verify the code changes \
                     thoroughly and ensure proper testing.",
                ),
                PromptRule::new(
                    "description",
                    "hotfix",
                    "This is a hotfix. Ensure the changes are minimal, well-tested, and don't \
                     introduce new issues.",
                ),
                PromptRule::new(
                    "pipeline_name",
                    "load-test",
                    "This is a load testing pipeline. Check cluster capacity and existing load \
                     before approving. Consider resource impact on other workloads.",
                ),
                PromptRule::new(
                    "description",
                    "deployment",
                    "This involves deployment changes. Check current cluster resource utilization \
                     and ensure sufficient capacity for the deployment.",
                ),
            ],
            considerations: [
                "Code quality and best practices in the changes",
                "Security vulnerabilities in the modified code",
                "Breaking changes or potential deployment issues",
                "Test coverage and quality of tests",
                "Documentation and commit message quality",
                "Compliance with coding standards and conventions",
                "Dependencies and their security status",
                "Performance impact of the changes",
                "Current cluster resource utilization and capacity",
                "Number of existing PipelineRuns and their impact on cluster load",
                "Pod resource consumption and availability",
                "Potential resource contention with existing workloads",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            output_format_instruction: DEFAULT_OUTPUT_FORMAT.into(),
            missing_context_notice: DEFAULT_MISSING_CONTEXT_NOTICE.into(),
        }
    }
}

const DEFAULT_BASE_TEMPLATE: &str = "\
You are a Senior DevOps Engineer who analyzes Tekton PipelineRuns and their associated code changes.

Your job is to:
1. Analyze the code changes in the last commit of the PipelineRun
2. Check for security vulnerabilities, code quality issues, and best practices
3. Evaluate the impact of changes on the pipeline and deployment
4. Check cluster resource availability and current load before approving
5. Make approve/reject decisions based on comprehensive analysis

Analyze this ApprovalTask and make a decision:

PipelineRun: {pipeline_run_name}
Pipeline: {pipeline_name}
Description: {description}

GitHub tools (list_commits, get_commit) cover the code changes. Kubernetes tools \
(resources_list, resources_get) cover PipelineRuns, Pods and cluster capacity.

Available tools: {tool_list}

Before approving, check cluster load:
- PipelineRuns: resources_list(apiVersion=\"tekton.dev/v1\", kind=\"PipelineRun\", namespace=\"default\")
- Pods: resources_list(apiVersion=\"v1\", kind=\"Pod\", namespace=\"default\")
- Capacity: resources_list(apiVersion=\"v1\", kind=\"Node\")

Fetch only the latest commit (one page, one entry) and analyze ONLY its diff. \
Do not fetch entire file contents, multiple commits, or repository metadata.
";

const DEFAULT_OUTPUT_FORMAT: &str = "
IMPORTANT: Finish with your decision in exactly this shape:

Decision: [approve/reject]

**Reasoning:**
[Your detailed reasoning here]";

const DEFAULT_MISSING_CONTEXT_NOTICE: &str = "
NO PIPELINE SPEC AVAILABLE:
Git information for PipelineRun {pipeline_run_name} (pipeline {pipeline_name}) could not be \
resolved, so the code changes cannot be located.

Base the decision on the description, the pipeline information and the current cluster \
state (PipelineRun and Pod counts, node capacity). This is a limited analysis.
";

// ============================================================
// Loading
// ============================================================

impl ApproverConfig {
    /// Load config from a TOML file. A missing file yields defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Overlay environment variables: `MODEL_NAME`, `API_KEY`,
    /// `GITHUB_PERSONAL_ACCESS_TOKEN`, `KUBERNETES_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(model) = non_empty("MODEL_NAME") {
            self.model.name = model;
        }
        if let Some(key) = non_empty("API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(token) = non_empty("GITHUB_PERSONAL_ACCESS_TOKEN") {
            self.tools.github_token = Some(token);
        }
        if let Some(token) = non_empty("KUBERNETES_TOKEN") {
            self.tools.kubernetes_token = Some(token);
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    /// Secrets are skipped.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.approver.analysis_timeout_secs)
    }

    pub fn pipeline_run_label(&self) -> String {
        format!("{}pipelineRun", self.approver.label_prefix)
    }

    pub fn pipeline_label(&self) -> String {
        format!("{}pipeline", self.approver.label_prefix)
    }

    fn check(&self) -> Result<()> {
        if self.approver.name.is_empty() {
            return Err(Error::config("approver.name must not be empty"));
        }
        if self.approver.reviewed_annotation.is_empty() {
            return Err(Error::config("approver.reviewed_annotation must not be empty"));
        }
        if self.approver.analysis_timeout_secs == 0 {
            return Err(Error::config("approver.analysis_timeout_secs must be positive"));
        }
        Ok(())
    }
}
