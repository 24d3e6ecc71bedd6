//! Reelcap Common Utilities
//!
//! Shared infrastructure for all Reelcap crates:
//! - Error taxonomy and result alias
//! - Recording clock and clock-domain normalization
//! - Capture configuration (persisted user defaults)
//! - Tracing/logging initialization

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
