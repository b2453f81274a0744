//! Frame sinks and the write-after-close guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use super::frame::DownstreamFrame;

/// The client is gone; the frame was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("downstream closed")]
pub struct SinkClosed;

/// Destination for client frames (an HTTP body, a channel, a test recorder).
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: DownstreamFrame) -> Result<(), SinkClosed>;

    /// Whether the receiving side is already known to be gone.
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    async fn send(&self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        (**self).send(frame).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Sink backed by a bounded mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DownstreamFrame>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A channel sink and the receiver the client side reads from.
pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<DownstreamFrame>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx }, rx)
}

/// Wraps a sink with a single `closed` flag.
///
/// Once closed, by [`close`](Self::close), by a failed write, or by a write
/// still pending at the write deadline, every later frame is dropped without
/// touching the inner sink.
#[derive(Debug)]
pub struct GuardedSink<S> {
    inner: S,
    closed: AtomicBool,
    write_deadline: Option<Instant>,
}

impl<S: FrameSink> GuardedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
            write_deadline: None,
        }
    }

    /// Give up on writes that cannot complete by `deadline`. A client that
    /// stays connected but stops reading is then treated as gone.
    pub fn set_write_deadline(&mut self, deadline: Instant) {
        self.write_deadline = Some(deadline);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the sink. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Write a frame unless closed. Returns whether it was delivered.
    pub async fn send(&self, frame: DownstreamFrame) -> bool {
        if self.is_closed() {
            trace!(?frame, "dropping frame after close");
            return false;
        }
        if self.inner.is_closed() {
            debug!("client disconnected; closing downstream");
            self.close();
            return false;
        }
        let write = self.inner.send(frame);
        let written = match self.write_deadline {
            // a ready write still lands after the deadline
            Some(deadline) => match time::timeout_at(deadline, write).await {
                Ok(written) => written,
                Err(_) => {
                    warn!("client stopped reading before the request deadline; closing downstream");
                    self.close();
                    return false;
                }
            },
            None => write.await,
        };
        match written {
            Ok(()) => true,
            Err(SinkClosed) => {
                debug!("downstream write failed; closing downstream");
                self.close();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> DownstreamFrame {
        DownstreamFrame::TextDelta {
            id: "t".into(),
            delta: text.into(),
        }
    }

    #[tokio::test]
    async fn writes_after_close_are_dropped() {
        let (sink, mut rx) = channel(8);
        let guarded = GuardedSink::new(sink);
        assert!(guarded.send(delta("a")).await);
        assert!(guarded.close());
        assert!(!guarded.close());
        assert!(!guarded.send(delta("b")).await);
        drop(guarded);

        assert_eq!(rx.recv().await, Some(delta("a")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_channel_closes_the_guard_at_the_write_deadline() {
        let (sink, mut rx) = channel(1);
        let mut guarded = GuardedSink::new(sink);
        let start = Instant::now();
        guarded.set_write_deadline(start + std::time::Duration::from_secs(2));

        assert!(guarded.send(delta("a")).await);
        assert!(!guarded.send(delta("b")).await);
        assert!(guarded.is_closed());
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(2));

        assert_eq!(rx.recv().await, Some(delta("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_writes_land_after_the_write_deadline() {
        let (sink, mut rx) = channel(4);
        let mut guarded = GuardedSink::new(sink);
        guarded.set_write_deadline(Instant::now());
        time::advance(std::time::Duration::from_secs(1)).await;

        assert!(guarded.send(delta("late")).await);
        assert_eq!(rx.recv().await, Some(delta("late")));
    }

    #[tokio::test]
    async fn dropped_receiver_closes_the_guard() {
        let (sink, rx) = channel(8);
        let guarded = GuardedSink::new(sink);
        drop(rx);
        assert!(!guarded.send(delta("a")).await);
        assert!(guarded.is_closed());
        assert!(!guarded.send(delta("b")).await);
    }
}
