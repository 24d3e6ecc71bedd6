//! Live capture source interface.
//!
//! Sources push frames and samples from OS-managed threads; the engine
//! never pulls. Downstream must not block the delivery callback beyond
//! brief queue contention: backpressure is handled by the per-track
//! bounded queues, never by stalling capture.

use reelcap_common::error::RecorderResult;

use crate::track::RawUnit;

/// Events pushed by a capture source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A video frame.
    Video(RawUnit),

    /// An audio buffer (system audio for the screen source, mic input
    /// for the mic source).
    Audio(RawUnit),

    /// The source stopped delivering and will not recover.
    Interrupted { message: String },

    /// The source reached end of stream after a stop request.
    Ended,
}

/// Delivery callback handed to a source at start.
pub type SourceSink = Box<dyn Fn(SourceEvent) + Send + Sync>;

/// A live OS-level capture stream.
///
/// `start` begins delivery into the sink; `stop` halts delivery and
/// releases OS capture resources. Permission problems surface at
/// construction time, before any recording starts, never mid-session.
pub trait CaptureSource: Send {
    /// Begin pushing events into `sink`.
    fn start(&mut self, sink: SourceSink) -> RecorderResult<()>;

    /// Halt delivery and release capture resources.
    fn stop(&mut self) -> RecorderResult<()>;
}
