//! Reelcap Platform Integration
//!
//! The OS boundary of the recorder: discovering capturable displays and
//! windows, applying the exclusion policy, and probing screen-capture and
//! microphone access before a session starts.

pub mod permissions;
pub mod sources;

pub use sources::*;
