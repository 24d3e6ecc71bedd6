//! Platform media backend seam.
//!
//! The session assembles its pipelines through this trait so the
//! lifecycle logic can run against scripted implementations in tests
//! while production uses GStreamer.

use std::path::Path;

use reelcap_common::config::{CaptureConfiguration, VideoContainer};
use reelcap_common::error::RecorderResult;
use reelcap_platform::permissions;
use reelcap_platform::{ExclusionList, SourceCatalog, SourceEnumerator};

use crate::encoder::EncodeBackend;
use crate::muxer::ContainerSink;
use crate::pipeline::{GstContainerSink, GstEncodeBackend, GstMicSource, GstScreenSource};
use crate::session::ResolvedSelection;
use crate::source::CaptureSource;
use crate::track::TrackSpec;

/// Factory for the platform-specific halves of a recording session.
pub trait CaptureBackend: Send {
    /// Verify screen-capture access. Fatal before recording starts,
    /// never surfaced mid-session.
    fn ensure_screen_access(&self) -> RecorderResult<()>;

    /// Probe microphone availability. Failure degrades the mic track.
    fn probe_microphone(&self) -> RecorderResult<()>;

    /// Enumerate capturable sources with the exclusion policy applied.
    fn refresh_sources(&self, config: &CaptureConfiguration) -> RecorderResult<SourceCatalog>;

    /// Open the screen capture source (video, plus system audio when
    /// requested). Permission problems surface here, before recording.
    fn open_screen_source(
        &self,
        selection: &ResolvedSelection,
        config: &CaptureConfiguration,
        capture_system_audio: bool,
    ) -> RecorderResult<Box<dyn CaptureSource>>;

    /// Open the microphone source. Failure degrades the mic track.
    fn open_mic_source(&self, sample_rate: u32) -> RecorderResult<Box<dyn CaptureSource>>;

    /// Create the compression backend for one track.
    fn encoder_backend(&self, spec: &TrackSpec) -> RecorderResult<Box<dyn EncodeBackend>>;

    /// Open the container writer for the output file.
    fn container_sink(
        &self,
        path: &Path,
        container: VideoContainer,
        specs: &[TrackSpec],
    ) -> RecorderResult<Box<dyn ContainerSink>>;
}

/// GStreamer-backed production backend.
pub struct GstBackend;

impl CaptureBackend for GstBackend {
    fn ensure_screen_access(&self) -> RecorderResult<()> {
        permissions::ensure_screen_capture_access()
    }

    fn probe_microphone(&self) -> RecorderResult<()> {
        permissions::probe_microphone()
    }

    fn refresh_sources(&self, config: &CaptureConfiguration) -> RecorderResult<SourceCatalog> {
        SourceEnumerator::new(ExclusionList::with_defaults(), config.exclude_self).refresh()
    }

    fn open_screen_source(
        &self,
        selection: &ResolvedSelection,
        config: &CaptureConfiguration,
        capture_system_audio: bool,
    ) -> RecorderResult<Box<dyn CaptureSource>> {
        Ok(Box::new(GstScreenSource::open(
            selection,
            config,
            capture_system_audio,
        )?))
    }

    fn open_mic_source(&self, sample_rate: u32) -> RecorderResult<Box<dyn CaptureSource>> {
        Ok(Box::new(GstMicSource::open(sample_rate)?))
    }

    fn encoder_backend(&self, spec: &TrackSpec) -> RecorderResult<Box<dyn EncodeBackend>> {
        Ok(Box::new(GstEncodeBackend::new(spec)?))
    }

    fn container_sink(
        &self,
        path: &Path,
        container: VideoContainer,
        specs: &[TrackSpec],
    ) -> RecorderResult<Box<dyn ContainerSink>> {
        Ok(Box::new(GstContainerSink::open(path, container, specs)?))
    }
}

/// The default backend for this platform.
pub fn default_backend() -> Box<dyn CaptureBackend> {
    Box::new(GstBackend)
}
