//! Sluice: a streaming agent loop for tool-calling LLMs.
//!
//! Sits between a client and a model provider. Each client request drives one
//! [`agent_loop::AgentLoop`] run: the model's server-sent event stream is
//! decoded incrementally, text is re-streamed to the client as
//! start/delta/end frames, tool calls are buffered until complete, dispatched
//! through a [`tools::ToolRegistry`], and fed back to the model until it
//! answers without calling a tool or a bound is hit.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sluice::prelude::*;
//!
//! # async fn example() -> sluice::error::Result<()> {
//! let config = SluiceConfig::load()?;
//! let model: ModelSpec = "anthropic:claude-sonnet-4-5".parse()?;
//! let provider = sluice::provider::create_provider(&model, &config)?;
//! let agent = AgentLoop::new(Arc::from(provider), Arc::new(ToolRegistry::new()));
//!
//! let (sink, mut frames) = sluice::downstream::channel(64);
//! let request = ChatRequest::new("conv-1", vec![ConversationTurn::user("2+2?")]);
//! tokio::spawn(async move { agent.run(request, sink).await });
//! while let Some(frame) = frames.recv().await {
//!     print!("{}", frame.to_line());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod downstream;
pub mod error;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;
