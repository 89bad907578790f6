//! Agent runtime - one analysis is one conversation with a bounded tool loop

use approver_core::{AnalysisRequest, ModelConfig};
use approver_engine::{Analyzer, AnalyzerError};
use approver_llm::{
    AccumulatedToolCall, AnthropicProvider, ContentBlock, LlmError, LlmMessage, LlmProvider,
    LlmRequest, StreamDelta,
};
use approver_tools::ToolRegistry;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_TOOL_RESULT_CHARS: usize = 50_000;

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_iterations: usize,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for AgentConfig {
    fn from(model: &ModelConfig) -> Self {
        Self {
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            max_tool_iterations: model.max_tool_iterations,
            system_prompt: None,
        }
    }
}

pub struct LlmAnalyzer {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl LlmAnalyzer {
    /// Analyzer backed by the Anthropic API.
    pub fn new(api_key: &str, base_url: Option<&str>, tools: ToolRegistry, config: AgentConfig) -> Self {
        let mut provider = AnthropicProvider::new(api_key);
        if let Some(url) = base_url {
            provider = provider.with_base_url(url);
        }
        Self::with_provider(Arc::new(provider), tools, config)
    }

    pub fn with_provider(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight analyses when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Stream one model turn, collecting text and tool calls.
    async fn turn(
        &self,
        messages: &[LlmMessage],
    ) -> Result<(String, Vec<AccumulatedToolCall>), AnalyzerError> {
        let mut request = LlmRequest::new(self.config.model.clone());
        request.messages = messages.to_vec();
        request.max_tokens = Some(self.config.max_tokens);
        request.system = self.config.system_prompt.clone();
        if !self.tools.is_empty() {
            request.tools = Some(self.tools.get_definitions());
        }

        let mut stream = self
            .provider
            .complete_stream(request, Some(self.cancel.clone()))
            .await
            .map_err(llm_error)?;

        let mut text = String::new();
        let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
        let mut current_tool: Option<AccumulatedToolCall> = None;

        while let Some(delta) = stream.next().await {
            match delta.map_err(llm_error)? {
                StreamDelta::Text(t) => text.push_str(&t),
                StreamDelta::ToolCallStart { id, name } => {
                    current_tool = Some(AccumulatedToolCall {
                        id,
                        name,
                        arguments: String::new(),
                    });
                }
                StreamDelta::ToolCallDelta { arguments, .. } => {
                    if let Some(tool) = current_tool.as_mut() {
                        tool.arguments.push_str(&arguments);
                    }
                }
                StreamDelta::ToolCallEnd { .. } => {
                    if let Some(tool) = current_tool.take() {
                        tool_calls.push(tool);
                    }
                }
                StreamDelta::Done { stop_reason, usage } => {
                    debug!("Turn done: stop_reason={:?} usage={:?}", stop_reason, usage);
                }
                StreamDelta::Error(e) => return Err(AnalyzerError::Invocation(e)),
            }
        }

        Ok((text, tool_calls))
    }

    async fn run_tool(&self, call: &AccumulatedToolCall) -> (String, bool) {
        let result = match call.parse_arguments() {
            Ok(args) => {
                self.tools
                    .execute_cancellable(&call.name, args, self.cancel.clone())
                    .await
            }
            Err(e) => approver_tools::ToolResult::error(format!(
                "invalid arguments for {}: {}",
                call.name, e
            )),
        };
        let is_error = result.is_error();
        if is_error {
            warn!("Tool {} failed: {}", call.name, result.to_content_string());
        }

        let content = result.to_content_string();
        let total = content.chars().count();
        let content = if total > MAX_TOOL_RESULT_CHARS {
            let head: String = content.chars().take(MAX_TOOL_RESULT_CHARS).collect();
            format!("{}...\n[truncated, {} total chars]", head, total)
        } else {
            content
        };
        (content, is_error)
    }
}

fn llm_error(e: LlmError) -> AnalyzerError {
    match e {
        LlmError::Cancelled => AnalyzerError::Cancelled,
        LlmError::AuthFailed(m) => AnalyzerError::Unavailable(format!("authentication failed: {}", m)),
        other => AnalyzerError::Invocation(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Analyzer for LlmAnalyzer {
    fn advertise_capabilities(&self) -> Vec<String> {
        self.tools.list().into_iter().map(str::to_string).collect()
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let mut messages = vec![LlmMessage::user(request.as_str())];
        let mut transcript: Vec<String> = Vec::new();
        let mut iterations = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AnalyzerError::Cancelled);
            }
            iterations += 1;
            if iterations > self.config.max_tool_iterations + 1 {
                return Err(AnalyzerError::Invocation(format!(
                    "max tool iterations ({}) exceeded",
                    self.config.max_tool_iterations
                )));
            }

            let (text, tool_calls) = self.turn(&messages).await?;

            if tool_calls.is_empty() {
                info!(
                    "Analysis complete after {} turn(s) via {}",
                    iterations,
                    self.provider.name()
                );
                if !text.trim().is_empty() {
                    return Ok(text);
                }
                return Ok(transcript.join("\n"));
            }

            let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
            if !text.is_empty() {
                blocks.push(ContentBlock::Text { text: text.clone() });
                transcript.push(text);
            }
            blocks.extend(tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc
                    .parse_arguments()
                    .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            }));
            messages.push(LlmMessage::assistant(blocks));

            let mut results = Vec::with_capacity(tool_calls.len());
            for tc in &tool_calls {
                debug!("Executing tool {} ({})", tc.name, tc.id);
                let (content, is_error) = self.run_tool(tc).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content,
                    is_error: is_error.then_some(true),
                });
            }
            messages.push(LlmMessage::user(results));

            debug!("Tool calls executed, continuing loop (iteration {})", iterations);
        }
    }
}
