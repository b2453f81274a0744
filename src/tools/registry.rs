//! Name-to-tool lookup and fault-free invocation.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::{ParsedToolCall, ToolInvocationResult};
use crate::provider::ToolDefinition;

/// Bounds for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvocationBudget {
    pub timeout: Duration,
    pub max_result_bytes: usize,
}

/// Registered tools, in registration order.
///
/// Built once and then shared read-only (`Arc<ToolRegistry>`) across
/// concurrent runs.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "replacing previously registered tool");
        } else {
            self.order.push(name);
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Schemas sent upstream with every request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect()
    }

    /// Run one call. Never fails: unknown tools, tool errors, panics and
    /// timeouts all come back as error results.
    pub async fn invoke(
        &self,
        call: &ParsedToolCall,
        ctx: &ToolExecutionContext,
        budget: InvocationBudget,
    ) -> ToolInvocationResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "model called an unknown tool");
            return ToolInvocationResult::failure(
                &call.id,
                &call.name,
                format!("tool '{}' not found", call.name),
            );
        };

        let args = ToolArguments::new(call.arguments.clone());
        let execution = AssertUnwindSafe(tool.execute(&args, ctx)).catch_unwind();

        match tokio::time::timeout(budget.timeout, execution).await {
            Ok(Ok(Ok(output))) => {
                debug!(tool = %call.name, call_id = %call.id, "tool succeeded");
                let mut result = ToolInvocationResult::success(
                    &call.id,
                    &call.name,
                    truncate_output(output, budget.max_result_bytes),
                );
                result.display = tool.display_to_client();
                result
            }
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool returned an error");
                ToolInvocationResult::failure(&call.id, &call.name, e.to_string())
            }
            Ok(Err(_)) => {
                warn!(tool = %call.name, call_id = %call.id, "tool panicked");
                ToolInvocationResult::failure(&call.id, &call.name, "tool panicked")
            }
            Err(_) => {
                let ms = budget.timeout.as_millis();
                warn!(tool = %call.name, call_id = %call.id, timeout_ms = ms as u64, "tool timed out");
                ToolInvocationResult::failure(
                    &call.id,
                    &call.name,
                    format!("tool timed out after {ms}ms"),
                )
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

/// Cap the serialized size of a tool output. Oversized outputs become a
/// string cut at a char boundary with a truncation marker appended.
pub fn truncate_output(output: Value, max_bytes: usize) -> Value {
    let serialized = output.to_string();
    if serialized.len() <= max_bytes {
        return output;
    }
    let mut cut = max_bytes;
    while !serialized.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = serialized.len() - cut;
    Value::String(format!("{}…[truncated {dropped} bytes]", &serialized[..cut]))
}
