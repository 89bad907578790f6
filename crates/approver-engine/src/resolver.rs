//! Context resolution: look up the pipeline specification behind a run

use approver_core::PipelineSpec;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed pipeline run {name}: {message}")]
    Malformed { name: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Resolves a PipelineRun to its pipeline specification.
///
/// `Ok(None)` means the specification is unavailable; callers continue with
/// reduced context.
#[async_trait::async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve_pipeline_run(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PipelineSpec>, ResolveError>;
}

/// Never has context.
pub struct NoContext;

#[async_trait::async_trait]
impl ContextResolver for NoContext {
    async fn resolve_pipeline_run(
        &self,
        _name: &str,
        _namespace: &str,
    ) -> Result<Option<PipelineSpec>, ResolveError> {
        Ok(None)
    }
}

/// In-memory resolver keyed by `(namespace, name)`.
#[derive(Default)]
pub struct StaticResolver {
    runs: HashMap<(String, String), PipelineSpec>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: PipelineSpec,
    ) {
        self.runs.insert((namespace.into(), name.into()), spec);
    }

    pub fn with(mut self, namespace: &str, name: &str, spec: PipelineSpec) -> Self {
        self.insert(namespace, name, spec);
        self
    }
}

#[async_trait::async_trait]
impl ContextResolver for StaticResolver {
    async fn resolve_pipeline_run(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PipelineSpec>, ResolveError> {
        Ok(self
            .runs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
