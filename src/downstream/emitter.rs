//! Translates loop output into client frames.

use tokio::time::Instant;

use crate::tools::ToolInvocationResult;

use super::frame::DownstreamFrame;
use super::sink::{FrameSink, GuardedSink};

/// Frames one response as a single text run, whatever the number of
/// upstream iterations behind it, and writes exactly one terminal frame.
#[derive(Debug)]
pub struct DownstreamEmitter<S> {
    sink: GuardedSink<S>,
    text_id: String,
    started: bool,
    terminated: bool,
}

impl<S: FrameSink> DownstreamEmitter<S> {
    pub fn new(sink: S, text_id: impl Into<String>) -> Self {
        Self {
            sink: GuardedSink::new(sink),
            text_id: text_id.into(),
            started: false,
            terminated: false,
        }
    }

    /// Bound every write, the terminal frame included, by `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.sink.set_write_deadline(deadline);
        self
    }

    /// Forward a text fragment; the first non-empty one opens the run.
    pub async fn text(&mut self, fragment: &str) {
        if self.terminated || fragment.is_empty() {
            return;
        }
        if !self.started {
            self.started = true;
            self.sink
                .send(DownstreamFrame::TextStart {
                    id: self.text_id.clone(),
                })
                .await;
        }
        self.sink
            .send(DownstreamFrame::TextDelta {
                id: self.text_id.clone(),
                delta: fragment.to_string(),
            })
            .await;
    }

    /// Side-channel frame for a display-designated tool result.
    pub async fn tool_output(&mut self, result: &ToolInvocationResult) {
        if self.terminated {
            return;
        }
        self.sink
            .send(DownstreamFrame::ToolOutput {
                tool_call_id: result.tool_call_id.clone(),
                tool_name: result.tool_name.clone(),
                output: result.output.clone(),
            })
            .await;
    }

    /// Normal end: `TextEnd` if a text run was opened, then close.
    pub async fn finish(&mut self) {
        if std::mem::replace(&mut self.terminated, true) {
            return;
        }
        if self.started {
            self.sink
                .send(DownstreamFrame::TextEnd {
                    id: self.text_id.clone(),
                })
                .await;
        }
        self.sink.close();
    }

    /// Error end: a single `Error` frame, then close.
    pub async fn fail(&mut self, message: impl Into<String>) {
        if std::mem::replace(&mut self.terminated, true) {
            return;
        }
        self.sink
            .send(DownstreamFrame::Error {
                error_text: message.into(),
            })
            .await;
        self.sink.close();
    }

    /// Whether the client can no longer receive frames.
    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::channel;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    async fn drain(mut rx: mpsc::Receiver<DownstreamFrame>) -> Vec<DownstreamFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn text_run_is_opened_once_and_closed_once() {
        let (sink, rx) = channel(16);
        let mut emitter = DownstreamEmitter::new(sink, "t1");
        emitter.text("").await;
        emitter.text("x is").await;
        emitter.text(" 1").await;
        emitter.finish().await;
        emitter.finish().await;
        emitter.text("late").await;
        drop(emitter);

        assert_eq!(
            drain(rx).await,
            vec![
                DownstreamFrame::TextStart { id: "t1".into() },
                DownstreamFrame::TextDelta {
                    id: "t1".into(),
                    delta: "x is".into()
                },
                DownstreamFrame::TextDelta {
                    id: "t1".into(),
                    delta: " 1".into()
                },
                DownstreamFrame::TextEnd { id: "t1".into() },
            ]
        );
    }

    #[tokio::test]
    async fn finish_without_text_emits_nothing() {
        let (sink, rx) = channel(4);
        let mut emitter = DownstreamEmitter::new(sink, "t1");
        emitter.finish().await;
        drop(emitter);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn failure_replaces_text_end() {
        let (sink, rx) = channel(8);
        let mut emitter = DownstreamEmitter::new(sink, "t1");
        emitter.text("partial").await;
        emitter.fail("upstream closed").await;
        emitter.finish().await;
        emitter.fail("again").await;
        drop(emitter);

        let frames = drain(rx).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[2],
            DownstreamFrame::Error {
                error_text: "upstream closed".into()
            }
        );
    }
}
