//! Error types shared across Reelcap crates.
//!
//! The variants mirror the failure taxonomy of a recording session:
//! environment errors that prevent a session from starting, track-scoped
//! runtime errors the session can absorb, and file-level errors that are
//! always fatal.

/// Top-level error type for Reelcap operations.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The OS reported no capturable displays. Unrecoverable environment
    /// error, never retried.
    #[error("Enumeration error: {message}")]
    Enumeration { message: String },

    /// Screen-capture access denied. Fatal, raised before any recording
    /// starts.
    #[error("Screen capture permission denied: {message}")]
    PermissionDenied { message: String },

    /// A live capture source stopped delivering (display disconnected,
    /// window closed). Track-scoped; fatal only for the video track.
    #[error("Capture source interrupted ({track}): {message}")]
    SourceInterrupted { track: String, message: String },

    /// Microphone denied or device unavailable. Degrades the mic track,
    /// never aborts the session.
    #[error("Microphone unavailable: {message}")]
    MicUnavailable { message: String },

    /// A track encoder failed to initialize. Track-scoped; fatal only for
    /// the video track.
    #[error("Encoder initialization failed ({track}): {message}")]
    EncoderInit { track: String, message: String },

    /// The container writer failed. Fatal to the session; the output file
    /// may be left partially complete.
    #[error("Container write error: {message}")]
    Write { message: String },

    /// `finish()` called on an already-finalized writer. A defect in the
    /// caller, not a runtime condition to recover from.
    #[error("Multiplexer already finalized")]
    AlreadyFinalized,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RecorderError.
pub type RecorderResult<T> = Result<T, RecorderError>;

impl RecorderError {
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::Enumeration {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn source_interrupted(track: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceInterrupted {
            track: track.into(),
            message: msg.into(),
        }
    }

    pub fn mic_unavailable(msg: impl Into<String>) -> Self {
        Self::MicUnavailable {
            message: msg.into(),
        }
    }

    pub fn encoder_init(track: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::EncoderInit {
            track: track.into(),
            message: msg.into(),
        }
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }
}
