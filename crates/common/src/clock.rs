//! Clock utilities for timestamp normalization.
//!
//! Each capture source delivers presentation timestamps on its own clock
//! domain (the OS schedules screen, system audio, and microphone delivery
//! independently). The session anchors every domain to a single session
//! clock so that all tracks share one timeline in the output container.

use std::time::Instant;

/// Monotonic session clock, anchored at the moment recording started.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,
    epoch_wall: String,
}

impl RecordingClock {
    /// Anchor a new clock to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds elapsed since recording start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start (RFC 3339).
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Maps one capture clock domain onto the session timeline.
///
/// The first timestamp observed from a source fixes the mapping: that
/// instant on the source clock corresponds to the session-elapsed time at
/// which the unit arrived. Every later timestamp is shifted by the same
/// offset, preserving the source's own pacing.
#[derive(Debug, Default)]
pub struct DomainAnchor {
    anchor: Option<AnchorPoint>,
}

#[derive(Debug, Clone, Copy)]
struct AnchorPoint {
    source_ns: u64,
    session_ns: u64,
}

impl DomainAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a source-domain timestamp to the session timeline.
    ///
    /// The first call anchors the domain at `session_now_ns`; later calls
    /// only use the stored anchor, so concurrent session-clock reads do
    /// not skew the track's internal pacing.
    pub fn normalize(&mut self, source_ns: u64, session_now_ns: u64) -> u64 {
        let anchor = *self.anchor.get_or_insert(AnchorPoint {
            source_ns,
            session_ns: session_now_ns,
        });
        anchor
            .session_ns
            .saturating_add(source_ns.saturating_sub(anchor.source_ns))
    }

    /// Session time at which this domain delivered its first unit, if any.
    pub fn anchored_at_ns(&self) -> Option<u64> {
        self.anchor.map(|a| a.session_ns)
    }
}

/// Drift between a track and the session's reference track, measured from
/// their anchor offsets at stop time.
#[derive(Debug, Clone, Copy)]
pub struct TrackDrift {
    pub reference_ns: u64,
    pub measured_ns: u64,
}

impl TrackDrift {
    /// Drift in nanoseconds (positive = measured anchored later).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_elapsed_is_small_right_after_start() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
    }

    #[test]
    fn anchor_maps_first_timestamp_to_session_now() {
        let mut anchor = DomainAnchor::new();
        assert_eq!(anchor.normalize(5_000, 1_000_000), 1_000_000);
        assert_eq!(anchor.anchored_at_ns(), Some(1_000_000));
    }

    #[test]
    fn anchor_preserves_source_pacing() {
        let mut anchor = DomainAnchor::new();
        let first = anchor.normalize(100, 42);
        // 16ms later on the source clock, whatever the session clock says now
        let second = anchor.normalize(100 + 16_000_000, 999_999_999);
        assert_eq!(second - first, 16_000_000);
    }

    #[test]
    fn anchor_saturates_on_backwards_source_time() {
        let mut anchor = DomainAnchor::new();
        anchor.normalize(1_000, 500);
        // A source timestamp before the anchor clamps to the anchor point
        assert_eq!(anchor.normalize(900, 600), 500);
    }

    #[test]
    fn drift_measurement() {
        let drift = TrackDrift {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }
}
