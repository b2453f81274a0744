//! Built-in demo tools for the CLI and server.
//!
//! Business tools live with the application embedding the loop; these two
//! exist so that `sluice serve` and `sluice chat` can exercise the tool path
//! out of the box.
//!
//! ```rust
//! use sluice::tools::builtin::default_registry;
//!
//! let registry = default_registry();
//! assert_eq!(registry.len(), 2);
//! ```

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::tools::registry::ToolRegistry;
use crate::tools::tool::{AgentTool, Tool};
use crate::tools::types::AgentToolParameters;

/// Create the `current_time` tool. It returns the current UTC time.
pub fn current_time_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "current_time",
        "Get the current date and time in UTC",
        AgentToolParameters::empty(),
        |_args, _ctx| async move {
            let now = Utc::now();
            Ok(serde_json::json!({
                "utc": now.to_rfc3339_opts(SecondsFormat::Secs, true),
                "unix": now.timestamp(),
            }))
        },
    ))
}

/// Create the `echo` tool. It returns its input and shows it to the client.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "echo",
            "Repeat a message back verbatim; the user sees the result",
            AgentToolParameters::object()
                .string("message", "The message to repeat", true)
                .build(),
            |args, _ctx| async move {
                let message = args.get_str("message")?;
                Ok(serde_json::json!({ "message": message }))
            },
        )
        .displayed(),
    )
}

/// All built-in tools.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![current_time_tool(), echo_tool()]
}

/// A registry holding [`all_tools`].
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in all_tools() {
        registry.register(tool);
    }
    registry
}
