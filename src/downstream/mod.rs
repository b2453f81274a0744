//! Client-facing frame stream: frames, the guarded sink, and the emitter.

pub mod emitter;
pub mod frame;
pub mod sink;

pub use emitter::DownstreamEmitter;
pub use frame::DownstreamFrame;
pub use sink::{channel, ChannelSink, FrameSink, GuardedSink, SinkClosed};
