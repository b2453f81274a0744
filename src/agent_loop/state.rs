//! Per-run loop state and the summary returned when a run ends.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::tools::ToolInvocationResult;
use crate::types::{ConversationTurn, Usage};

/// Unique run identifier.
pub type RunId = Uuid;

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopPhase {
    /// Opening the upstream request.
    Calling,
    /// Consuming the upstream event stream.
    Decoding,
    /// Running this turn's tool calls, one at a time.
    Dispatching,
    /// Choosing between another upstream call and stopping.
    Deciding,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// The model answered without calling a tool.
    Completed,
    /// The iteration bound cut off further tool calling.
    IterationLimit,
    /// The wall-clock budget ran out between iterations.
    BudgetExhausted,
    /// A transport, decode or internal error ended the run.
    Failed,
}

/// Mutable state owned by one run.
#[derive(Debug)]
pub struct AgentLoopState {
    pub run_id: RunId,
    pub history: Vec<ConversationTurn>,
    /// 1-based count of upstream calls made so far.
    pub iteration: usize,
    /// All assistant text of the run, whether or not the client saw it.
    pub accumulated_text: String,
    pub phase: LoopPhase,
    pub displayed_results: Vec<ToolInvocationResult>,
    pub usage: Usage,
}

impl AgentLoopState {
    pub fn new(run_id: RunId, history: Vec<ConversationTurn>) -> Self {
        Self {
            run_id,
            history,
            iteration: 1,
            accumulated_text: String::new(),
            phase: LoopPhase::Calling,
            displayed_results: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn transition(&mut self, phase: LoopPhase) {
        tracing::debug!(
            run_id = %self.run_id,
            iteration = self.iteration,
            from = %self.phase,
            to = %phase,
            "loop phase"
        );
        self.phase = phase;
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Upstream calls made.
    pub iterations: usize,
    pub text: String,
    pub history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub usage: Usage,
}
