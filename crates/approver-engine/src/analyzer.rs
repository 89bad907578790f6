//! Analyzer trait: the external reasoning engine behind a narrow seam

use approver_core::AnalysisRequest;
use std::time::Duration;

/// Analyzer error types. The gate treats every variant the same way.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("invocation failed: {0}")]
    Invocation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// A reasoning engine that turns an analysis request into free-form text.
///
/// Implementations own their tool set; the gate only needs the names to
/// mention them in the request.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Capability (tool) names, in a stable order.
    fn advertise_capabilities(&self) -> Vec<String>;

    async fn run(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError>;
}

/// Replays a recorded response regardless of the request.
pub struct ReplayAnalyzer {
    response: String,
    capabilities: Vec<String>,
}

impl ReplayAnalyzer {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, names: Vec<String>) -> Self {
        self.capabilities = names;
        self
    }
}

#[async_trait::async_trait]
impl Analyzer for ReplayAnalyzer {
    fn advertise_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn run(&self, _request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        Ok(self.response.clone())
    }
}
