//! Directory-backed PipelineRun resolver
//!
//! Looks for `<dir>/<namespace>/<name>.json`, then `<dir>/<name>.json`.

use approver_core::PipelineSpec;
use approver_engine::{ContextResolver, ResolveError};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct DirResolver {
    dir: PathBuf,
}

impl DirResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, name: &str, namespace: &str) -> Vec<PathBuf> {
        let file = format!("{}.json", name);
        let mut paths = Vec::with_capacity(2);
        if !namespace.is_empty() {
            paths.push(self.dir.join(namespace).join(&file));
        }
        paths.push(self.dir.join(file));
        paths
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, ResolveError> {
    match tokio::fs::read_to_string(path).await {
        Ok(c) => Ok(Some(c)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl ContextResolver for DirResolver {
    async fn resolve_pipeline_run(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PipelineSpec>, ResolveError> {
        for path in self.candidates(name, namespace) {
            let Some(content) = read_if_exists(&path).await? else {
                continue;
            };
            debug!("Resolved PipelineRun {} from {}", name, path.display());
            let run: serde_json::Value =
                serde_json::from_str(&content).map_err(|e| ResolveError::Malformed {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            return Ok(PipelineSpec::from_pipeline_run(&run));
        }
        Ok(None)
    }
}
