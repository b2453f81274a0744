//! Shared test helpers: a scripted provider and a recording sink.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use sluice::downstream::{DownstreamFrame, FrameSink, SinkClosed};
use sluice::error::SluiceError;
use sluice::provider::{EventStream, ModelProvider, ProviderRequest};
use sluice::types::{StopReason, StreamEvent, Usage};

/// What the provider does for one upstream call.
pub enum Turn {
    /// Yield these items, in order, then end the stream.
    Events(Vec<Result<StreamEvent, SluiceError>>),
    /// Fail to open the stream.
    Fail(SluiceError),
    /// Yield these events, then never produce anything again.
    Stall(Vec<StreamEvent>),
}

/// A provider that replays queued turns and records every request.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    fallback: Option<Vec<StreamEvent>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replay `events` for every call once the queue is empty.
    pub fn repeating(events: Vec<StreamEvent>) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: Some(events),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn stream_turn(&self, request: &ProviderRequest) -> Result<EventStream, SluiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self.turns.lock().unwrap().pop_front();
        let turn = match (turn, &self.fallback) {
            (Some(turn), _) => turn,
            (None, Some(events)) => Turn::Events(events.iter().cloned().map(Ok).collect()),
            (None, None) => Turn::Events(text_turn("")),
        };
        match turn {
            Turn::Events(items) => Ok(futures::stream::iter(items).boxed()),
            Turn::Fail(err) => Err(err),
            Turn::Stall(events) => Ok(futures::stream::iter(events.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }
}

/// A plain text answer, split into the given fragments.
pub fn text_turn(text: &str) -> Vec<Result<StreamEvent, SluiceError>> {
    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(Ok(StreamEvent::text(text)));
    }
    events.push(Ok(finished(StopReason::EndTurn)));
    events
}

/// Events for one complete tool call whose arguments arrive in `fragments`.
pub fn tool_call_events(id: &str, name: &str, fragments: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::ToolCallStarted {
        id: id.into(),
        name: name.into(),
    }];
    events.extend(fragments.iter().map(|fragment| StreamEvent::ToolCallArgumentsDelta {
        id: id.into(),
        fragment: (*fragment).into(),
    }));
    events.push(StreamEvent::ToolCallFinished { id: id.into() });
    events
}

/// A turn that says `text` and then calls one tool.
pub fn tool_turn(text: &str, id: &str, name: &str, arguments: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(StreamEvent::text(text));
    }
    events.extend(tool_call_events(id, name, &[arguments]));
    events.push(finished(StopReason::ToolUse));
    events
}

pub fn finished(stop_reason: StopReason) -> StreamEvent {
    StreamEvent::TurnFinished {
        stop_reason: Some(stop_reason),
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        }),
    }
}

pub fn ok_events(events: Vec<StreamEvent>) -> Vec<Result<StreamEvent, SluiceError>> {
    events.into_iter().map(Ok).collect()
}

/// Records delivered frames; can simulate a client that goes away.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<DownstreamFrame>>>,
    attempts: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    disconnect_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnect once `frames` frames were delivered.
    pub fn disconnecting_after(frames: usize) -> Self {
        Self {
            disconnect_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<DownstreamFrame> {
        self.frames.lock().unwrap().clone()
    }

    /// Every `send` call, including ones refused after disconnect.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkClosed);
        }
        let mut frames = self.frames.lock().unwrap();
        frames.push(frame);
        if self.disconnect_after == Some(frames.len()) {
            self.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Compact names for frames, for sequence assertions.
pub fn kinds(frames: &[DownstreamFrame]) -> Vec<&'static str> {
    frames
        .iter()
        .map(|frame| match frame {
            DownstreamFrame::TextStart { .. } => "text-start",
            DownstreamFrame::TextDelta { .. } => "text-delta",
            DownstreamFrame::TextEnd { .. } => "text-end",
            DownstreamFrame::Error { .. } => "error",
            DownstreamFrame::ToolOutput { .. } => "tool-output",
        })
        .collect()
}

/// Checks `text-start? text-delta* (text-end | error)?`, ignoring
/// side-channel tool output frames.
pub fn assert_well_framed(frames: &[DownstreamFrame]) {
    let text: Vec<&str> = kinds(frames)
        .into_iter()
        .filter(|kind| *kind != "tool-output")
        .collect();
    let mut rest = text.as_slice();
    let started = rest.first() == Some(&"text-start");
    if started {
        rest = &rest[1..];
    }
    while rest.first() == Some(&"text-delta") {
        rest = &rest[1..];
    }
    match rest {
        [] => {}
        ["text-end"] => assert!(started, "text-end without text-start: {text:?}"),
        ["error"] => {}
        other => panic!("frames not well framed, trailing {other:?} in {text:?}"),
    }
    if !started {
        assert!(
            !text.contains(&"text-delta"),
            "text-delta before text-start: {text:?}"
        );
    }
}

/// Concatenated delta text.
pub fn streamed_text(frames: &[DownstreamFrame]) -> String {
    frames
        .iter()
        .filter_map(|frame| match frame {
            DownstreamFrame::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}
