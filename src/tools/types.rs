//! Tool-related types: parameter schemas, parsed calls, invocation results.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{ToolResult, ToolUse};

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: Value,
}

impl AgentToolParameters {
    /// Create from a raw JSON Schema value.
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "string", "description": description.into()}), required)
    }

    /// Add a number property.
    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "number", "description": description.into()}), required)
    }

    /// Add an integer property.
    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "integer", "description": description.into()}), required)
    }

    /// Add a boolean property.
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, json!({"type": "boolean", "description": description.into()}), required)
    }

    /// Add an enum (string) property.
    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        self.property(
            name,
            json!({"type": "string", "description": description.into(), "enum": values}),
            required,
        )
    }

    fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Build into AgentToolParameters.
    pub fn build(self) -> AgentToolParameters {
        AgentToolParameters {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// A finished tool call whose arguments parsed as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ParsedToolCall {
    pub fn to_tool_use(&self) -> ToolUse {
        ToolUse {
            id: self.id.clone(),
            name: self.name.clone(),
            input: Value::Object(self.arguments.clone()),
        }
    }
}

/// The outcome of one tool call. Always produced: failures carry an
/// `{"error": ...}` output rather than propagating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Surface this result to the client as a side-channel frame.
    #[serde(default)]
    pub display: bool,
}

impl ToolInvocationResult {
    pub fn success(tool_call_id: impl Into<String>, tool_name: impl Into<String>, output: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
            error: None,
            display: false,
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output: json!({ "error": message }),
            error: Some(message),
            display: false,
        }
    }

    /// Synthetic answer for a call whose arguments never parsed.
    pub fn malformed(tool_call_id: impl Into<String>, tool_name: impl Into<String>, raw: &str) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output: json!({ "error": "malformed_arguments", "raw_arguments": raw }),
            error: Some("malformed_arguments".to_string()),
            display: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_tool_result(&self) -> ToolResult {
        ToolResult {
            tool_use_id: self.tool_call_id.clone(),
            payload: self.output.clone(),
            is_error: self.is_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_required_properties() {
        let params = AgentToolParameters::object()
            .string("city", "City name", true)
            .integer("days", "Forecast length", false)
            .string_enum("unit", "Unit", &["c", "f"], true)
            .build();
        assert_eq!(params.schema["required"], json!(["city", "unit"]));
        assert_eq!(params.schema["properties"]["unit"]["enum"], json!(["c", "f"]));
    }

    #[test]
    fn failures_are_encoded_as_error_payloads() {
        let result = ToolInvocationResult::failure("call_1", "get_x", "boom");
        assert_eq!(result.output, json!({"error": "boom"}));
        let block = result.to_tool_result();
        assert!(block.is_error);
        assert_eq!(block.tool_use_id, "call_1");
    }

    #[test]
    fn malformed_result_keeps_raw_arguments() {
        let result = ToolInvocationResult::malformed("call_1", "get_x", "{invalid");
        assert_eq!(result.output["error"], "malformed_arguments");
        assert_eq!(result.output["raw_arguments"], "{invalid");
    }
}
