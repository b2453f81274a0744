//! OpenAI Chat Completions API provider (streaming).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::SluiceError;
use crate::types::{ContentBlock, ConversationTurn, Role, StopReason, StreamEvent, Usage};

use super::http::{bearer_headers, post_stream};
use super::sse::{map_sse_stream, FrameMapper, SseFrame};
use super::{payload_text, EventStream, ModelProvider, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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
        let messages: Vec<Value> = request.turns.iter().flat_map(turn_to_openai).collect();

        let mut body = json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(max) = request.settings.max_tokens {
                obj.insert("max_tokens".into(), max.into());
            }
            if let Some(temp) = request.settings.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = request.settings.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(ref stops) = request.settings.stop_sequences {
                obj.insert("stop".into(), json!(stops));
            }
            if !request.tools.is_empty() {
                let tool_defs: Vec<Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tool_defs.into());
            }
        }

        body
    }
}

/// One conversation turn becomes one message, except tool turns, which
/// become one `role: tool` message per result.
fn turn_to_openai(turn: &ConversationTurn) -> Vec<Value> {
    match turn.role {
        Role::System => vec![json!({ "role": "system", "content": turn.text_content() })],
        Role::User => vec![json!({ "role": "user", "content": turn.text_content() })],
        Role::Assistant => {
            let text = turn.text_content();
            let tool_calls: Vec<Value> = turn
                .tool_uses()
                .into_iter()
                .map(|tool_use| {
                    json!({
                        "id": tool_use.id,
                        "type": "function",
                        "function": {
                            "name": tool_use.name,
                            "arguments": tool_use.input.to_string(),
                        }
                    })
                })
                .collect();
            let mut message = json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            });
            if !tool_calls.is_empty() {
                message["tool_calls"] = Value::Array(tool_calls);
            }
            vec![message]
        }
        Role::Tool => turn
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult(result) => Some(json!({
                    "role": "tool",
                    "tool_call_id": result.tool_use_id,
                    "content": payload_text(&result.payload),
                })),
                _ => None,
            })
            .collect(),
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SluiceError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model_id, turns = request.turns.len(), "OpenAI stream_turn");

        let response = post_stream(&url, bearer_headers(&self.api_key), &body).await?;
        Ok(map_sse_stream(
            response.bytes_stream(),
            OpenAiFrameMapper::default(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

/// Maps chat-completion chunks onto [`StreamEvent`]s.
///
/// Tool call deltas are keyed by `index`; the first delta carrying an `id`
/// opens the call. Open calls are finished when a `finish_reason` arrives,
/// or at `[DONE]` for servers that never send one.
#[derive(Debug, Default)]
pub struct OpenAiFrameMapper {
    open_calls: BTreeMap<usize, String>,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
    terminated: bool,
}

impl OpenAiFrameMapper {
    fn finish_open_calls(&mut self, events: &mut Vec<StreamEvent>) {
        let open = std::mem::take(&mut self.open_calls);
        events.extend(
            open.into_values()
                .map(|id| StreamEvent::ToolCallFinished { id }),
        );
    }

    fn map_tool_call(&mut self, delta: ToolCallDelta, events: &mut Vec<StreamEvent>) {
        let function = delta.function.unwrap_or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            if self.open_calls.get(&delta.index) != Some(&id) {
                if let Some(previous) = self.open_calls.remove(&delta.index) {
                    events.push(StreamEvent::ToolCallFinished { id: previous });
                }
                self.open_calls.insert(delta.index, id.clone());
                events.push(StreamEvent::ToolCallStarted {
                    id,
                    name: function.name.clone().unwrap_or_default(),
                });
            }
        }

        let Some(fragment) = function.arguments.filter(|args| !args.is_empty()) else {
            return;
        };
        match self.open_calls.get(&delta.index) {
            Some(id) => events.push(StreamEvent::ToolCallArgumentsDelta {
                id: id.clone(),
                fragment,
            }),
            None => warn!(
                index = delta.index,
                "tool call arguments before the call was opened"
            ),
        }
    }
}

impl FrameMapper for OpenAiFrameMapper {
    fn map(&mut self, frame: SseFrame) -> Result<Vec<StreamEvent>, SluiceError> {
        let mut events = Vec::new();

        if frame.data.trim() == DONE_MARKER {
            self.finish_open_calls(&mut events);
            self.terminated = true;
            events.push(StreamEvent::TurnFinished {
                stop_reason: self.stop_reason.take(),
                usage: self.usage.take(),
            });
            return Ok(events);
        }

        let chunk: ChatChunk = match serde_json::from_str(&frame.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, data = %frame.data, "skipping unparseable OpenAI chunk");
                return Ok(events);
            }
        };

        if let Some(error) = chunk.error {
            return Err(SluiceError::Stream(error.message));
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|text| !text.is_empty()) {
                events.push(StreamEvent::TextDelta { text });
            }
            for delta in choice.delta.tool_calls {
                self.map_tool_call(delta, &mut events);
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.stop_reason = Some(StopReason::from_vendor(reason));
                self.finish_open_calls(&mut events);
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        Ok(events)
    }

    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::sse::tests::decode_chunks;
    use crate::types::{ToolResult, ToolUse};
    use pretty_assertions::assert_eq;

    /// Decode one body; fails the test unless it ends at `[DONE]`.
    async fn decode(raw: &str) -> Vec<StreamEvent> {
        decode_chunks(vec![raw.as_bytes().to_vec()], OpenAiFrameMapper::default())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[tokio::test]
    async fn maps_parallel_tool_calls_by_index() {
        let raw = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"type\":\"function\",\"function\":{\"name\":\"get_x\",\"arguments\":\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"type\":\"function\",\"function\":{\"name\":\"get_y\",\"arguments\":\"{\\\"q\\\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"arguments\":\":1}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":4,\"total_tokens\":13}}\n\n",
            "data: [DONE]\n\n",
        );

        let events = decode(raw).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStarted {
                    id: "call_a".into(),
                    name: "get_x".into()
                },
                StreamEvent::ToolCallStarted {
                    id: "call_b".into(),
                    name: "get_y".into()
                },
                StreamEvent::ToolCallArgumentsDelta {
                    id: "call_b".into(),
                    fragment: "{\"q\"".into()
                },
                StreamEvent::ToolCallArgumentsDelta {
                    id: "call_a".into(),
                    fragment: "{}".into()
                },
                StreamEvent::ToolCallArgumentsDelta {
                    id: "call_b".into(),
                    fragment: ":1}".into()
                },
                StreamEvent::ToolCallFinished { id: "call_a".into() },
                StreamEvent::ToolCallFinished { id: "call_b".into() },
                StreamEvent::TurnFinished {
                    stop_reason: Some(StopReason::ToolUse),
                    usage: Some(Usage {
                        input_tokens: 9,
                        output_tokens: 4,
                        total_tokens: 13
                    }),
                },
            ]
        );
    }

    #[tokio::test]
    async fn done_closes_calls_left_open() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"f\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = decode(raw).await;
        assert_eq!(events[0], StreamEvent::text("hi"));
        assert_eq!(
            events[3],
            StreamEvent::ToolCallFinished { id: "call_1".into() }
        );
        assert!(matches!(
            events[4],
            StreamEvent::TurnFinished {
                stop_reason: None,
                ..
            }
        ));
    }

    #[test]
    fn error_chunk_aborts_the_stream() {
        let mut mapper = OpenAiFrameMapper::default();
        let result = mapper.map(SseFrame {
            event: None,
            data: r#"{"error":{"message":"server overloaded"}}"#.into(),
        });
        assert!(matches!(result, Err(SluiceError::Stream(msg)) if msg == "server overloaded"));
    }

    #[test]
    fn request_body_maps_tool_turns_to_tool_messages() {
        let provider = OpenAiProvider::new("gpt-test".into(), "key".into(), None);
        let request = ProviderRequest {
            turns: vec![
                ConversationTurn::user("x?"),
                ConversationTurn::assistant_with_tool_uses(
                    "checking",
                    vec![ToolUse {
                        id: "call_1".into(),
                        name: "get_x".into(),
                        input: json!({}),
                    }],
                ),
                ConversationTurn::tool_results(vec![ToolResult {
                    tool_use_id: "call_1".into(),
                    payload: json!({"x": 1}),
                    is_error: false,
                }]),
            ],
            ..Default::default()
        };

        let body = provider.build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"], "checking");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
        assert_eq!(messages[2]["content"], r#"{"x":1}"#);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("tools").is_none());
    }
}
