//! Anthropic Messages API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmContent, LlmRequest, StreamDelta, Usage, DEFAULT_MAX_TOKENS};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn request_body(request: &LlmRequest) -> AnthropicRequest {
    AnthropicRequest {
        model: request.model.clone(),
        messages: request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.clone(),
                content: match &m.content {
                    LlmContent::Text(s) => serde_json::json!(s),
                    LlmContent::Blocks(blocks) => {
                        serde_json::to_value(blocks).unwrap_or_default()
                    }
                },
            })
            .collect(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream: true,
        system: request.system.clone(),
        tools: request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect()
        }),
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let body = request_body(&request);
        debug!(
            "Anthropic request: model={} messages={} tools={}",
            body.model,
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len())
        );

        let send = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match &cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LlmError::Cancelled),
                r = send => r?,
            },
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited {
                    retry_after_ms: 60_000,
                },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let stream = parse_sse_stream(response.bytes_stream());
        match cancel {
            Some(token) => Ok(Box::pin(cancellable(stream, token))),
            None => Ok(Box::pin(stream)),
        }
    }
}

/// Ends the stream with [`LlmError::Cancelled`] once `token` fires.
fn cancellable(
    inner: impl Stream<Item = LlmResult<StreamDelta>> + Send + 'static,
    token: CancellationToken,
) -> impl Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        tokio::pin!(inner);
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                n = inner.next() => Some(n),
            };
            match next {
                Some(Some(item)) => {
                    yield item;
                }
                Some(None) => break,
                None => {
                    yield Err(LlmError::Cancelled);
                    break;
                }
            }
        }
    }
}

/// Decode an Anthropic SSE byte stream into deltas.
///
/// Events may be split across chunks at any byte, including inside a
/// multi-byte character.
pub fn parse_sse_stream<E>(
    bytes_stream: impl Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
) -> impl Stream<Item = LlmResult<StreamDelta>> + Send
where
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut current_tool_id: Option<String> = None;
        let mut stop_reason: Option<String> = None;
        let mut usage: Option<Usage> = None;

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some((event_end, sep_len)) = find_event_boundary(&buffer) {
                let raw: Vec<u8> = buffer.drain(..event_end + sep_len).collect();
                let event_str = String::from_utf8_lossy(&raw[..event_end]);

                let mut event_type = String::new();
                let mut event_data = String::new();
                for line in event_str.lines() {
                    if let Some(rest) = line.strip_prefix("event:") {
                        event_type = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        event_data.push_str(rest.trim_start());
                    }
                }

                if event_data.is_empty() {
                    continue;
                }
                trace!("SSE event {}: {}", event_type, event_data);

                match event_type.as_str() {
                    "message_start" => {
                        if let Ok(data) = serde_json::from_str::<MessageStart>(&event_data) {
                            usage = data.message.usage;
                        }
                    }
                    "content_block_start" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStart>(&event_data) {
                            if let ContentBlockType::ToolUse { id, name } = data.content_block {
                                current_tool_id = Some(id.clone());
                                yield Ok(StreamDelta::ToolCallStart { id, name });
                            }
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&event_data) {
                            match data.delta {
                                DeltaType::TextDelta { text } => {
                                    yield Ok(StreamDelta::Text(text));
                                }
                                DeltaType::InputJsonDelta { partial_json } => {
                                    if let Some(id) = &current_tool_id {
                                        yield Ok(StreamDelta::ToolCallDelta {
                                            id: id.clone(),
                                            arguments: partial_json,
                                        });
                                    }
                                }
                                DeltaType::Other => {}
                            }
                        }
                    }
                    "content_block_stop" => {
                        if let Some(id) = current_tool_id.take() {
                            yield Ok(StreamDelta::ToolCallEnd { id });
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDelta>(&event_data) {
                            if let Some(reason) = data.delta.stop_reason {
                                debug!("Message complete: stop_reason={}", reason);
                                stop_reason = Some(reason);
                            }
                            if let Some(u) = data.usage {
                                let merged = usage.get_or_insert_with(Usage::default);
                                merged.output_tokens = u.output_tokens;
                            }
                        }
                    }
                    "message_stop" => {
                        yield Ok(StreamDelta::Done {
                            stop_reason: stop_reason.take().or_else(|| Some("end_turn".into())),
                            usage: usage.take(),
                        });
                    }
                    "error" => {
                        let err = match serde_json::from_str::<ErrorEvent>(&event_data) {
                            Ok(data) => LlmError::StreamError(data.error.message),
                            Err(_) => LlmError::InvalidResponse(event_data.clone()),
                        };
                        yield Err(err);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Position and length of the first blank-line separator.
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Deserialize)]
struct MessageStartBody {
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: ContentBlockType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockType {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
