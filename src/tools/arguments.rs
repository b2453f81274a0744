//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::SluiceError;

/// Wrapper around a parsed argument object providing typed extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// The arguments as a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, SluiceError> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SluiceError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, SluiceError> {
        self.values
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SluiceError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, SluiceError> {
        self.values
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| SluiceError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, SluiceError> {
        self.values
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| SluiceError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, SluiceError> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            SluiceError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
