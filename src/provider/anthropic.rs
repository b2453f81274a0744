//! Anthropic Messages API provider (streaming).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::SluiceError;
use crate::types::{ContentBlock, Role, StopReason, StreamEvent, Usage};

use super::http::{anthropic_headers, post_stream};
use super::sse::{map_sse_stream, FrameMapper, SseFrame};
use super::{payload_text, EventStream, ModelProvider, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(model_id: String, api_key: String, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model_id,
            api_key,
        }
    }

    fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for turn in &request.turns {
            let role = match turn.role {
                Role::System => {
                    system_parts.push(turn.text_content());
                    continue;
                }
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };
            let content: Vec<Value> = turn.content.iter().filter_map(block_to_anthropic).collect();
            if content.is_empty() {
                continue;
            }
            messages.push(json!({ "role": role, "content": content }));
        }

        let mut body = json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".into(), system_parts.join("\n").into());
            }
            if let Some(temp) = request.settings.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = request.settings.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(ref stops) = request.settings.stop_sequences {
                obj.insert("stop_sequences".into(), json!(stops));
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

fn block_to_anthropic(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(json!({ "type": "text", "text": text })),
        ContentBlock::ToolUse(tool_use) => Some(json!({
            "type": "tool_use",
            "id": tool_use.id,
            "name": tool_use.name,
            "input": tool_use.input,
        })),
        ContentBlock::ToolResult(result) => Some(json!({
            "type": "tool_result",
            "tool_use_id": result.tool_use_id,
            "content": payload_text(&result.payload),
            "is_error": result.is_error,
        })),
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SluiceError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model_id, turns = request.turns.len(), "Anthropic stream_turn");

        let response = post_stream(&url, anthropic_headers(&self.api_key, API_VERSION), &body).await?;
        Ok(map_sse_stream(
            response.bytes_stream(),
            AnthropicFrameMapper::default(),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: MessageStartBody,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// An open `tool_use` content block.
#[derive(Debug)]
struct ToolBlock {
    id: String,
    has_arguments: bool,
}

/// Maps Messages API stream events onto [`StreamEvent`]s.
///
/// Tool-use blocks are tracked by content block index so that
/// `input_json_delta` and `content_block_stop` can be attributed to the
/// call id announced in `content_block_start`. A call to a tool without
/// parameters streams no argument text at all; it is finished with `{}`.
#[derive(Debug, Default)]
pub struct AnthropicFrameMapper {
    tool_blocks: HashMap<usize, ToolBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    terminated: bool,
}

impl FrameMapper for AnthropicFrameMapper {
    fn map(&mut self, frame: SseFrame) -> Result<Vec<StreamEvent>, SluiceError> {
        let event: AnthropicEvent = match serde_json::from_str(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, data = %frame.data, "skipping unparseable Anthropic frame");
                return Ok(Vec::new());
            }
        };

        let events = match event {
            AnthropicEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.usage.input_tokens = usage.input_tokens;
                }
                Vec::new()
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlockStart::ToolUse { id, name } => {
                    self.tool_blocks.insert(
                        index,
                        ToolBlock {
                            id: id.clone(),
                            has_arguments: false,
                        },
                    );
                    vec![StreamEvent::ToolCallStarted { id, name }]
                }
                ContentBlockStart::Text { text } if !text.is_empty() => {
                    vec![StreamEvent::TextDelta { text }]
                }
                _ => Vec::new(),
            },
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![StreamEvent::TextDelta { text }],
                BlockDelta::InputJsonDelta { partial_json } => match self.tool_blocks.get_mut(&index) {
                    Some(_) if partial_json.is_empty() => Vec::new(),
                    Some(block) => {
                        block.has_arguments = true;
                        vec![StreamEvent::ToolCallArgumentsDelta {
                            id: block.id.clone(),
                            fragment: partial_json,
                        }]
                    }
                    None => {
                        warn!(index, "input_json_delta for a block that is not a tool call");
                        Vec::new()
                    }
                },
                BlockDelta::Other => Vec::new(),
            },
            AnthropicEvent::ContentBlockStop { index } => match self.tool_blocks.remove(&index) {
                Some(ToolBlock {
                    id,
                    has_arguments: true,
                }) => vec![StreamEvent::ToolCallFinished { id }],
                Some(ToolBlock { id, .. }) => vec![
                    StreamEvent::ToolCallArgumentsDelta {
                        id: id.clone(),
                        fragment: "{}".into(),
                    },
                    StreamEvent::ToolCallFinished { id },
                ],
                None => Vec::new(),
            },
            AnthropicEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.stop_reason = Some(StopReason::from_vendor(reason));
                }
                if let Some(usage) = usage {
                    self.usage.output_tokens = usage.output_tokens;
                    if usage.input_tokens > 0 {
                        self.usage.input_tokens = usage.input_tokens;
                    }
                }
                Vec::new()
            }
            AnthropicEvent::MessageStop => {
                self.terminated = true;
                let mut usage = std::mem::take(&mut self.usage);
                usage.total_tokens = usage.input_tokens + usage.output_tokens;
                vec![StreamEvent::TurnFinished {
                    stop_reason: self.stop_reason.take(),
                    usage: Some(usage),
                }]
            }
            AnthropicEvent::Error { error } => {
                return Err(SluiceError::Stream(format!(
                    "{}: {}",
                    error.kind, error.message
                )));
            }
            AnthropicEvent::Ping | AnthropicEvent::Unknown => Vec::new(),
        };
        Ok(events)
    }

    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
