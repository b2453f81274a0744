//! Typed events decoded from a provider's streaming response.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::usage::Usage;

/// One decoded event of an upstream model turn.
///
/// Providers translate their vendor wire format into this shape; the agent
/// loop only ever sees these five events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta { text: String },
    /// A tool call block opened; arguments follow as fragments.
    ToolCallStarted { id: String, name: String },
    /// A fragment of the tool call's JSON arguments, verbatim.
    ToolCallArgumentsDelta { id: String, fragment: String },
    /// The tool call block closed; its argument buffer is complete.
    ToolCallFinished { id: String },
    /// The upstream turn ended with its terminal marker.
    TurnFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn finished(stop_reason: StopReason) -> Self {
        Self::TurnFinished {
            stop_reason: Some(stop_reason),
            usage: None,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFilter,
    Other,
}

impl StopReason {
    /// Map a vendor stop/finish reason string.
    pub fn from_vendor(raw: &str) -> Self {
        match raw {
            "end_turn" | "stop" => Self::EndTurn,
            "tool_use" | "tool_calls" | "function_call" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "content_filter" | "refusal" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}
