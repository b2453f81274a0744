//! Convenience re-exports for common use.

pub use crate::agent_loop::{AgentLoop, ChatRequest, LoopLimits, RunStatus, RunSummary};
pub use crate::config::SluiceConfig;
pub use crate::downstream::{DownstreamFrame, FrameSink};
pub use crate::error::{Result, SluiceError};
pub use crate::models::ModelSpec;
pub use crate::provider::ModelProvider;
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry};
pub use crate::types::{ContentBlock, ConversationTurn, GenerationSettings, Role};
