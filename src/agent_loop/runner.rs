//! Drives one run end to end.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use serde_json::json;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::downstream::{DownstreamEmitter, FrameSink};
use crate::error::{Result, SluiceError};
use crate::provider::{EventStream, ModelProvider, ProviderRequest};
use crate::store::{NoopStore, Transcript, TranscriptStore};
use crate::tools::{
    InvocationBudget, ParsedToolCall, ToolExecutionContext, ToolInvocationResult, ToolRegistry,
};
use crate::types::{ConversationTurn, GenerationSettings, StopReason, StreamEvent, ToolUse};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::{remaining, with_timeout};

use super::accumulator::{FinishedToolCall, ToolCallAccumulator};
use super::limits::{LoopLimits, MalformedToolCallPolicy};
use super::rewriter::rewrite_with_tool_results;
use super::state::{AgentLoopState, LoopPhase, RunId, RunStatus, RunSummary};

/// One client request: the conversation so far and who is asking.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub run_id: RunId,
    pub conversation_id: String,
    pub caller_id: Option<String>,
    pub messages: Vec<ConversationTurn>,
    pub settings: GenerationSettings,
}

impl ChatRequest {
    pub fn new(conversation_id: impl Into<String>, messages: Vec<ConversationTurn>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            caller_id: None,
            messages,
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Text and calls collected from one upstream turn.
#[derive(Debug, Default)]
struct DecodedTurn {
    text: String,
    calls: Vec<FinishedToolCall>,
    stop_reason: Option<StopReason>,
}

/// A call that will be answered in this iteration.
enum PlannedCall {
    Invoke(ParsedToolCall),
    Malformed { id: String, name: String, raw: String },
}

/// The agent loop. Cheap to clone; one instance serves concurrent runs.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn TranscriptStore>,
    limits: LoopLimits,
    retry: RetryPolicy,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn ModelProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            store: Arc::new(NoopStore),
            limits: LoopLimits::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn limits(&self) -> &LoopLimits {
        &self.limits
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the loop for one request, streaming frames into `sink`.
    ///
    /// Never fails: errors, including panics inside the loop, end the run
    /// with an `Error` frame and [`RunStatus::Failed`]. The transcript is
    /// persisted once before returning.
    pub async fn run<S: FrameSink>(&self, request: ChatRequest, sink: S) -> RunSummary {
        let run_id = request.run_id;
        let deadline = Instant::now() + self.limits.request_budget;
        let mut emitter =
            DownstreamEmitter::new(sink, format!("text_{}", run_id.simple())).with_deadline(deadline);
        let mut state = AgentLoopState::new(run_id, request.messages.clone());

        info!(
            run_id = %run_id,
            conversation_id = %request.conversation_id,
            provider = self.provider.provider_name(),
            model = self.provider.model_id(),
            "run started"
        );

        let outcome = AssertUnwindSafe(self.drive(&mut state, &mut emitter, &request, deadline))
            .catch_unwind()
            .await;
        let (status, error) = match outcome {
            Ok(Ok(status)) => (status, None),
            Ok(Err(e)) => {
                error!(run_id = %run_id, iteration = state.iteration, phase = %state.phase, category = ?e.category(), error = %e, "run failed");
                (RunStatus::Failed, Some(e.to_string()))
            }
            Err(panic) => {
                error!(run_id = %run_id, phase = %state.phase, panic = panic_message(panic.as_ref()), "run panicked");
                (RunStatus::Failed, Some("internal error".to_string()))
            }
        };

        state.transition(LoopPhase::Done);
        let client_connected = !emitter.is_closed();
        match &error {
            Some(message) => emitter.fail(message.clone()).await,
            None => emitter.finish().await,
        }

        info!(
            run_id = %run_id,
            status = %status,
            iterations = state.iteration,
            client_connected,
            "run finished"
        );

        let transcript = Transcript {
            run_id,
            conversation_id: request.conversation_id.clone(),
            caller_id: request.caller_id.clone(),
            status,
            iterations: state.iteration,
            text: state.accumulated_text.clone(),
            displayed_results: std::mem::take(&mut state.displayed_results),
            history: state.history.clone(),
            error: error.clone(),
            finished_at: Utc::now(),
        };
        if let Err(e) = self.store.persist(transcript).await {
            error!(run_id = %run_id, error = %e, "failed to persist transcript");
        }

        RunSummary {
            run_id,
            status,
            iterations: state.iteration,
            text: state.accumulated_text,
            history: state.history,
            error,
            usage: state.usage,
        }
    }

    async fn drive<S: FrameSink>(
        &self,
        state: &mut AgentLoopState,
        emitter: &mut DownstreamEmitter<S>,
        request: &ChatRequest,
        deadline: Instant,
    ) -> Result<RunStatus> {
        let tools = self.registry.definitions();

        loop {
            state.transition(LoopPhase::Calling);
            let provider_request = ProviderRequest {
                turns: state.history.clone(),
                tools: tools.clone(),
                settings: request.settings.clone(),
            };
            let stream = self.open_stream(&provider_request, deadline).await?;

            state.transition(LoopPhase::Decoding);
            let turn = self.decode_turn(state, emitter, stream, deadline).await?;
            let planned = self.plan(turn.calls);

            if planned.is_empty() {
                state.transition(LoopPhase::Deciding);
                if !turn.text.is_empty() {
                    state.history.push(ConversationTurn::assistant(turn.text));
                }
                info!(run_id = %state.run_id, iteration = state.iteration, stop_reason = ?turn.stop_reason, "model answered");
                return Ok(RunStatus::Completed);
            }

            state.transition(LoopPhase::Dispatching);
            let (tool_uses, results) = self
                .dispatch(state, emitter, request, planned, deadline)
                .await;
            rewrite_with_tool_results(&mut state.history, &turn.text, tool_uses, results)?;

            state.transition(LoopPhase::Deciding);
            if state.iteration >= self.limits.max_iterations {
                warn!(
                    run_id = %state.run_id,
                    iteration = state.iteration,
                    max_iterations = self.limits.max_iterations,
                    "iteration limit reached; stopping tool loop"
                );
                return Ok(RunStatus::IterationLimit);
            }
            if remaining(deadline).is_none() {
                warn!(run_id = %state.run_id, iteration = state.iteration, "request budget spent; stopping tool loop");
                return Ok(RunStatus::BudgetExhausted);
            }
            state.iteration += 1;
        }
    }

    /// Open the upstream stream, retrying failures that happen before any
    /// event was produced.
    async fn open_stream(&self, request: &ProviderRequest, deadline: Instant) -> Result<EventStream> {
        let budget_ms = self.limits.request_budget.as_millis() as u64;
        let left = remaining(deadline).ok_or(SluiceError::Timeout(budget_ms))?;
        let attempt = self.retry.execute(|| self.provider.stream_turn(request));
        with_timeout(left, attempt).await
    }

    async fn decode_turn<S: FrameSink>(
        &self,
        state: &mut AgentLoopState,
        emitter: &mut DownstreamEmitter<S>,
        mut stream: EventStream,
        deadline: Instant,
    ) -> Result<DecodedTurn> {
        let idle = self.limits.stream_idle_timeout;
        let budget_ms = self.limits.request_budget.as_millis() as u64;
        let idle_sleep = time::sleep(idle);
        let budget_sleep = time::sleep_until(deadline);
        tokio::pin!(idle_sleep);
        tokio::pin!(budget_sleep);

        let mut accumulator = ToolCallAccumulator::new();
        let mut turn = DecodedTurn::default();

        loop {
            let next = tokio::select! {
                _ = &mut budget_sleep => return Err(SluiceError::Timeout(budget_ms)),
                _ = &mut idle_sleep => return Err(SluiceError::Timeout(idle.as_millis() as u64)),
                next = stream.next() => next,
            };
            let event = next.ok_or(SluiceError::AbruptTermination)??;
            idle_sleep.as_mut().reset(Instant::now() + idle);

            match event {
                StreamEvent::TextDelta { text } => {
                    state.accumulated_text.push_str(&text);
                    turn.text.push_str(&text);
                    emitter.text(&text).await;
                }
                StreamEvent::ToolCallStarted { id, name } => accumulator.start(id, name),
                StreamEvent::ToolCallArgumentsDelta { id, fragment } => {
                    accumulator.append(&id, &fragment)
                }
                StreamEvent::ToolCallFinished { id } => {
                    if let Some(finished) = accumulator.finish(&id) {
                        turn.calls.push(finished);
                    }
                }
                StreamEvent::TurnFinished { stop_reason, usage } => {
                    turn.stop_reason = stop_reason;
                    if let Some(usage) = usage {
                        state.usage.merge(&usage);
                    }
                    break;
                }
            }
        }

        turn.calls.extend(accumulator.drain_open());
        Ok(turn)
    }

    fn plan(&self, calls: Vec<FinishedToolCall>) -> Vec<PlannedCall> {
        calls
            .into_iter()
            .filter_map(|call| match call {
                FinishedToolCall::Parsed(parsed) => Some(PlannedCall::Invoke(parsed)),
                FinishedToolCall::Empty { .. } => None,
                FinishedToolCall::Malformed { id, name, raw, .. } => {
                    match self.limits.malformed_tool_calls {
                        MalformedToolCallPolicy::SyntheticError => {
                            Some(PlannedCall::Malformed { id, name, raw })
                        }
                        MalformedToolCallPolicy::Omit => {
                            warn!(call_id = %id, tool = %name, "dropping malformed tool call");
                            None
                        }
                    }
                }
            })
            .collect()
    }

    async fn dispatch<S: FrameSink>(
        &self,
        state: &mut AgentLoopState,
        emitter: &mut DownstreamEmitter<S>,
        request: &ChatRequest,
        planned: Vec<PlannedCall>,
        deadline: Instant,
    ) -> (Vec<ToolUse>, Vec<ToolInvocationResult>) {
        let mut tool_uses = Vec::with_capacity(planned.len());
        let mut results = Vec::with_capacity(planned.len());

        for call in planned {
            match call {
                PlannedCall::Invoke(call) => {
                    let result = match remaining(deadline) {
                        Some(left) => {
                            info!(run_id = %state.run_id, iteration = state.iteration, tool = %call.name, call_id = %call.id, "dispatching tool");
                            let ctx = ToolExecutionContext {
                                run_id: state.run_id.to_string(),
                                conversation_id: request.conversation_id.clone(),
                                caller_id: request.caller_id.clone(),
                                tool_call_id: call.id.clone(),
                            };
                            let budget = InvocationBudget {
                                timeout: left.min(self.limits.tool_timeout),
                                max_result_bytes: self.limits.max_tool_result_bytes,
                            };
                            self.registry.invoke(&call, &ctx, budget).await
                        }
                        None => ToolInvocationResult::failure(
                            &call.id,
                            &call.name,
                            "request budget exhausted before the tool ran",
                        ),
                    };
                    if result.display {
                        emitter.tool_output(&result).await;
                        state.displayed_results.push(result.clone());
                    }
                    tool_uses.push(call.to_tool_use());
                    results.push(result);
                }
                PlannedCall::Malformed { id, name, raw } => {
                    results.push(ToolInvocationResult::malformed(&id, &name, &raw));
                    tool_uses.push(ToolUse {
                        id,
                        name,
                        input: json!({}),
                    });
                }
            }
        }

        (tool_uses, results)
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model_id())
            .field("registry", &self.registry)
            .field("limits", &self.limits)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
