//! Server-sent event framing.
//!
//! Byte chunks are framed by [`eventsource_stream`], which tolerates lines
//! and multi-byte characters split across reads. A vendor [`FrameMapper`]
//! turns the frames into [`StreamEvent`]s.

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use crate::error::SluiceError;
use crate::types::StreamEvent;

use super::EventStream;

/// One dispatched event: its `event:` name and joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl From<Event> for SseFrame {
    fn from(event: Event) -> Self {
        // the parser reports unnamed events as "message"
        let name = (!event.event.is_empty() && event.event != "message").then_some(event.event);
        Self {
            event: name,
            data: event.data,
        }
    }
}

/// Vendor-specific translation of SSE frames into stream events.
pub trait FrameMapper: Send + 'static {
    /// Translate one frame. Unparseable frames should be logged and skipped;
    /// an `Err` aborts the stream.
    fn map(&mut self, frame: SseFrame) -> Result<Vec<StreamEvent>, SluiceError>;

    /// Whether the vendor's terminal marker has been seen.
    fn is_terminated(&self) -> bool;
}

fn framing_error<E: Into<SluiceError>>(err: EventStreamError<E>) -> SluiceError {
    match err {
        EventStreamError::Transport(e) => e.into(),
        EventStreamError::Utf8(e) => SluiceError::Stream(format!("invalid UTF-8 in event stream: {e}")),
        EventStreamError::Parser(e) => SluiceError::Stream(format!("malformed event stream: {e}")),
    }
}

/// Decode a byte stream into an [`EventStream`].
///
/// Reading stops at the terminal marker, dropping the byte stream. If the
/// bytes run out first the stream ends with
/// [`SluiceError::AbruptTermination`].
pub fn map_sse_stream<S, C, E, M>(bytes: S, mut mapper: M) -> EventStream
where
    S: Stream<Item = Result<C, E>> + Send + 'static,
    C: AsRef<[u8]> + Send + 'static,
    E: Into<SluiceError> + Send + 'static,
    M: FrameMapper,
{
    let stream = async_stream::stream! {
        let frames = bytes.eventsource();
        futures::pin_mut!(frames);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(event) => SseFrame::from(event),
                Err(e) => {
                    yield Err(framing_error(e));
                    return;
                }
            };
            match mapper.map(frame) {
                Ok(events) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
            if mapper.is_terminated() {
                return;
            }
        }

        yield Err(SluiceError::AbruptTermination);
    };
    Box::pin(stream)
}
