//! Approver Tools - capabilities the analyzer may call during a review
//!
//! To add a tool: implement [`Tool`] under src/tools/ and give it a name
//! in [`create_policy_registry`].

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolRegistry, ToolResult};
pub use tools::github::{GetCommitTool, GitHubClient, ListCommitsTool};
pub use tools::kubernetes::{KubeClient, ResourcesGetTool, ResourcesListTool};

use approver_core::ToolsConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Names [`create_policy_registry`] knows how to build.
pub const KNOWN_TOOLS: &[&str] = &["list_commits", "get_commit", "resources_list", "resources_get"];

/// Mounted into every pod that runs under a service account.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Build a registry holding only the tools named in `config.allowed`,
/// in that order. A tool that isn't registered is never offered to the model.
pub fn create_policy_registry(config: &ToolsConfig) -> ToolRegistry {
    let github = Arc::new(GitHubClient::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));
    if !github.has_token() {
        info!("No GitHub token configured, using unauthenticated API access");
    }
    let mut kube: Option<Arc<KubeClient>> = None;

    let mut registry = ToolRegistry::new();
    for name in &config.allowed {
        match name.as_str() {
            "list_commits" => registry.register(ListCommitsTool::new(github.clone())),
            "get_commit" => registry.register(GetCommitTool::new(github.clone())),
            "resources_list" => {
                let client = kube.get_or_insert_with(|| kube_client(config)).clone();
                registry.register(ResourcesListTool::new(client));
            }
            "resources_get" => {
                let client = kube.get_or_insert_with(|| kube_client(config)).clone();
                registry.register(ResourcesGetTool::new(client));
            }
            _ => warn!("Unknown tool in policy: {}", name),
        }
    }
    registry
}

/// Cluster client from config, falling back to the pod's service account.
fn kube_client(config: &ToolsConfig) -> Arc<KubeClient> {
    let sa_dir = Path::new(SERVICE_ACCOUNT_DIR);
    let token = config.kubernetes_token.clone().or_else(|| {
        std::fs::read_to_string(sa_dir.join("token"))
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    });
    if token.is_none() {
        info!("No Kubernetes token configured, cluster tools call the API anonymously");
    }

    let ca_file = config
        .kubernetes_ca_file
        .clone()
        .map(PathBuf::from)
        .or_else(|| Some(sa_dir.join("ca.crt")).filter(|p| p.exists()));
    let url = config.kubernetes_api_url.clone();

    if let Some(path) = ca_file {
        match std::fs::read(&path) {
            Ok(pem) => match KubeClient::with_ca_pem(url.clone(), token.clone(), &pem) {
                Ok(client) => return Arc::new(client),
                Err(e) => warn!("Ignoring cluster CA {}: {}", path.display(), e),
            },
            Err(e) => warn!("Cannot read cluster CA {}: {}", path.display(), e),
        }
    }
    Arc::new(KubeClient::new(url, token))
}
