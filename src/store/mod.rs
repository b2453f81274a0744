//! Transcript persistence seam.
//!
//! The loop persists exactly once per run, after the client has received
//! its terminal frame. Failures are logged by the loop and never reach the
//! client.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_loop::{RunId, RunStatus};
use crate::error::Result;
use crate::tools::ToolInvocationResult;
use crate::types::ConversationTurn;

/// Everything worth keeping about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub run_id: RunId,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub status: RunStatus,
    pub iterations: usize,
    /// The full assistant reply, including text the client may not have seen.
    pub text: String,
    /// Tool results that were designated for client display.
    pub displayed_results: Vec<ToolInvocationResult>,
    pub history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn persist(&self, transcript: Transcript) -> Result<()>;
}

/// Discards transcripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl TranscriptStore for NoopStore {
    async fn persist(&self, _transcript: Transcript) -> Result<()> {
        Ok(())
    }
}

/// Keeps transcripts in memory, for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    transcripts: Mutex<Vec<Transcript>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcripts(&self) -> Vec<Transcript> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TranscriptStore for InMemoryStore {
    async fn persist(&self, transcript: Transcript) -> Result<()> {
        self.transcripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transcript);
        Ok(())
    }
}
