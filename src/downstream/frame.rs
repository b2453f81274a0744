//! Frames written to the client, one JSON object per line.

use serde::{Deserialize, Serialize};

/// One unit of the client protocol.
///
/// A response is `text-start? text-delta* (text-end | error)?`, with
/// `tool-output` side-channel frames allowed anywhere in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DownstreamFrame {
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
    ToolOutput {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: serde_json::Value,
    },
}

impl DownstreamFrame {
    /// Serialize as a single NDJSON line, trailing newline included.
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","errorText":"frame serialization failed: {e}"}}"#)
        });
        line.push('\n');
        line
    }

    /// Whether this frame belongs to the start/delta/end text framing.
    pub fn is_text_framing(&self) -> bool {
        !matches!(self, Self::ToolOutput { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TextEnd { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frames_serialize_with_kebab_case_tags() {
        let delta = DownstreamFrame::TextDelta {
            id: "t1".into(),
            delta: "4".into(),
        };
        assert_eq!(delta.to_line(), "{\"type\":\"text-delta\",\"id\":\"t1\",\"delta\":\"4\"}\n");

        let error = DownstreamFrame::Error {
            error_text: "upstream unavailable".into(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"type": "error", "errorText": "upstream unavailable"})
        );
    }

    #[test]
    fn tool_output_is_outside_text_framing() {
        let frame = DownstreamFrame::ToolOutput {
            tool_call_id: "call_1".into(),
            tool_name: "echo".into(),
            output: serde_json::json!({"message": "hi"}),
        };
        assert!(!frame.is_text_framing());
        assert!(!frame.is_terminal());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "tool-output");
        assert_eq!(json["toolCallId"], "call_1");
    }
}
