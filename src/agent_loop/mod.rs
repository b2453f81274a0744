//! The agent loop: stream a turn, run its tool calls, feed results back,
//! repeat until the model stops calling tools or a bound is hit.

pub mod accumulator;
pub mod limits;
pub mod rewriter;
pub mod runner;
pub mod state;

pub use accumulator::{FinishedToolCall, PendingToolCall, ToolCallAccumulator};
pub use limits::{LoopLimits, MalformedToolCallPolicy};
pub use rewriter::rewrite_with_tool_results;
pub use runner::{AgentLoop, ChatRequest};
pub use state::{AgentLoopState, LoopPhase, RunId, RunStatus, RunSummary};
