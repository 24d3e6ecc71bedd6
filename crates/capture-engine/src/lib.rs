//! Reelcap Capture Engine
//!
//! Runs a capture-encode-mux recording session: a screen source (video
//! plus optional system audio) and an independent microphone source feed
//! per-track encoders, whose chunks a single writer thread interleaves
//! into one container file.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   RecordingSession                      │
//! │  ┌───────────┐  ┌───────────┐                          │
//! │  │  Screen   │  │    Mic    │   capture sources        │
//! │  │  Source   │  │  Source   │   (push, OS threads)     │
//! │  └──┬─────┬──┘  └─────┬─────┘                          │
//! │     │video│sys        │mic                             │
//! │  ┌──▼──┐┌─▼───┐  ┌────▼────┐                           │
//! │  │Track││Track│  │  Track  │   bounded queues +        │
//! │  │ Enc ││ Enc │  │   Enc   │   worker threads          │
//! │  └──┬──┘└──┬──┘  └────┬────┘                           │
//! │     └──────┼──────────┘                                │
//! │        ┌───▼────────┐                                  │
//! │        │ Multiplexer│   single writer thread           │
//! │        └───┬────────┘                                  │
//! │            ▼                                           │
//! │   Recording <date>.mp4                                 │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod encoder;
pub mod muxer;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod track;

pub use session::*;
pub use track::{EncodedChunk, RawUnit, TrackCodec, TrackEvent, TrackKind, TrackSpec};
