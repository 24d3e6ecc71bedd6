//! Track identities and the units that flow between pipeline stages.

use serde::{Deserialize, Serialize};

/// One independently encoded media stream within a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    SystemAudio,
    Mic,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::SystemAudio => "system-audio",
            TrackKind::Mic => "mic",
        }
    }

    /// Whether failure of this track aborts the whole session.
    /// A recording without video is not a usable recording; audio tracks
    /// only degrade.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, TrackKind::Video)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw frame or audio buffer as delivered by a capture source.
#[derive(Debug, Clone)]
pub struct RawUnit {
    /// Presentation timestamp, capture-clock-relative until the session
    /// normalizes it.
    pub pts_ns: u64,

    /// Pixel or sample payload.
    pub payload: Vec<u8>,

    /// Units the OS dropped since the previous callback.
    pub dropped_before: u32,
}

/// A compressed chunk produced by a track encoder.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub track: TrackKind,

    /// Presentation timestamp on the session timeline.
    pub pts_ns: u64,

    /// Whether the chunk can be decoded without prior chunks.
    pub keyframe: bool,

    pub payload: Vec<u8>,
}

/// Codec selection for one track, fixed for the track's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackCodec {
    H264 {
        width: u32,
        height: u32,
        fps: u32,
    },
    H265 {
        width: u32,
        height: u32,
        fps: u32,
    },
    Aac {
        bitrate_kbps: u32,
        sample_rate: u32,
    },
    Alac {
        sample_rate: u32,
    },
    Flac {
        sample_rate: u32,
    },
    Opus {
        bitrate_kbps: u32,
        sample_rate: u32,
    },
}

/// What the multiplexer needs to know about one track.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub kind: TrackKind,
    pub codec: TrackCodec,
}

/// Runtime notifications from tracks to the session supervisor.
#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// A capture source stopped delivering (display disconnected, window
    /// closed, device vanished).
    SourceInterrupted { track: TrackKind, message: String },

    /// A track encoder failed mid-session.
    EncoderFailed { track: TrackKind, message: String },
}

impl TrackEvent {
    pub fn track(&self) -> TrackKind {
        match self {
            TrackEvent::SourceInterrupted { track, .. } => *track,
            TrackEvent::EncoderFailed { track, .. } => *track,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TrackEvent::SourceInterrupted { message, .. } => message,
            TrackEvent::EncoderFailed { message, .. } => message,
        }
    }
}
