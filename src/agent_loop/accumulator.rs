//! Buffers streamed tool-call arguments until each call is finished.

use serde_json::Value;
use tracing::{debug, warn};

use crate::tools::ParsedToolCall;

/// A tool call between its start and finish events.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub argument_buffer: String,
}

/// What a finished call's buffer turned out to hold.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishedToolCall {
    /// Arguments parsed as a JSON object.
    Parsed(ParsedToolCall),
    /// No arguments were streamed at all; nothing to dispatch.
    Empty { id: String, name: String },
    /// Arguments were not a JSON object.
    Malformed {
        id: String,
        name: String,
        raw: String,
        reason: String,
    },
}

/// Per-turn argument buffers, in the order calls were started.
///
/// Fragments are appended verbatim; nothing is parsed until the call
/// finishes, so chunk boundaries never matter.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: Vec<PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        if self.pending.iter().any(|call| call.id == id) {
            warn!(call_id = %id, "duplicate tool call start ignored");
            return;
        }
        self.pending.push(PendingToolCall {
            id,
            name: name.into(),
            argument_buffer: String::new(),
        });
    }

    pub fn append(&mut self, id: &str, fragment: &str) {
        match self.pending.iter_mut().find(|call| call.id == id) {
            Some(call) => call.argument_buffer.push_str(fragment),
            None => warn!(call_id = %id, "argument fragment for unknown tool call dropped"),
        }
    }

    /// Close a call and parse its buffer. `None` if the id was never started.
    pub fn finish(&mut self, id: &str) -> Option<FinishedToolCall> {
        let Some(index) = self.pending.iter().position(|call| call.id == id) else {
            warn!(call_id = %id, "finish for unknown tool call ignored");
            return None;
        };
        Some(parse(self.pending.remove(index)))
    }

    /// Calls still open when the turn ended, reported as malformed.
    pub fn drain_open(&mut self) -> Vec<FinishedToolCall> {
        self.pending
            .drain(..)
            .map(|call| {
                warn!(call_id = %call.id, tool = %call.name, raw = %call.argument_buffer, "tool call never finished");
                FinishedToolCall::Malformed {
                    id: call.id,
                    name: call.name,
                    raw: call.argument_buffer,
                    reason: "tool call not finished".to_string(),
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn parse(call: PendingToolCall) -> FinishedToolCall {
    let PendingToolCall {
        id,
        name,
        argument_buffer,
    } = call;

    if argument_buffer.trim().is_empty() {
        debug!(call_id = %id, tool = %name, "tool call with empty arguments is a no-op");
        return FinishedToolCall::Empty { id, name };
    }

    match serde_json::from_str::<Value>(&argument_buffer) {
        Ok(Value::Object(arguments)) => FinishedToolCall::Parsed(ParsedToolCall {
            id,
            name,
            arguments,
        }),
        Ok(other) => {
            warn!(call_id = %id, tool = %name, raw = %argument_buffer, "tool arguments are not an object");
            FinishedToolCall::Malformed {
                id,
                name,
                raw: argument_buffer,
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }
        }
        Err(e) => {
            warn!(call_id = %id, tool = %name, raw = %argument_buffer, error = %e, "tool arguments did not parse");
            FinishedToolCall::Malformed {
                id,
                name,
                raw: argument_buffer,
                reason: e.to_string(),
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
