//! End-to-end session lifecycle tests with scripted sources, encoders,
//! and container sinks. No GStreamer or display server involved; the
//! scripted backend stands in for the platform so every failure mode is
//! reproducible.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use reelcap_capture_engine::backend::CaptureBackend;
use reelcap_capture_engine::encoder::EncodeBackend;
use reelcap_capture_engine::muxer::ContainerSink;
use reelcap_capture_engine::session::{
    RecordingSession, ResolvedSelection, SessionResult, SessionState,
};
use reelcap_capture_engine::source::{CaptureSource, SourceEvent, SourceSink};
use reelcap_capture_engine::track::{EncodedChunk, RawUnit, TrackKind, TrackSpec};
use reelcap_common::config::{CaptureConfiguration, SourceSelection, VideoContainer};
use reelcap_common::error::{RecorderError, RecorderResult};
use reelcap_platform::{DisplayInfo, SourceCatalog};

/// Sessions hold a process-wide recording guard; serialize the tests
/// that start one.
static SESSION_LOCK: Mutex<()> = Mutex::new(());

fn session_lock() -> std::sync::MutexGuard<'static, ()> {
    SESSION_LOCK
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

// -------------------------------------------------------------------
// Scripted components
// -------------------------------------------------------------------

/// Pushes a fixed number of frames (and audio buffers) from a worker
/// thread, then optionally reports an interruption.
struct ScriptedSource {
    frames: u32,
    with_audio: bool,
    audio_only: bool,
    interrupt: Option<&'static str>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    fn screen(frames: u32, with_audio: bool, interrupt: Option<&'static str>) -> Self {
        Self {
            frames,
            with_audio,
            audio_only: false,
            interrupt,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn mic(buffers: u32, interrupt: Option<&'static str>) -> Self {
        Self {
            frames: buffers,
            with_audio: false,
            audio_only: true,
            interrupt,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureSource for ScriptedSource {
    fn start(&mut self, sink: SourceSink) -> RecorderResult<()> {
        let frames = self.frames;
        let with_audio = self.with_audio;
        let audio_only = self.audio_only;
        let interrupt = self.interrupt;
        let stop = Arc::clone(&self.stop_flag);

        self.worker = Some(std::thread::spawn(move || {
            for i in 0..frames {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let unit = RawUnit {
                    pts_ns: 1_000 + u64::from(i) * 16_000_000,
                    payload: vec![0u8; 8],
                    dropped_before: 0,
                };
                if audio_only {
                    sink(SourceEvent::Audio(unit));
                } else {
                    sink(SourceEvent::Video(unit.clone()));
                    if with_audio {
                        sink(SourceEvent::Audio(unit));
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            if let Some(message) = interrupt {
                if !stop.load(Ordering::SeqCst) {
                    sink(SourceEvent::Interrupted {
                        message: message.to_string(),
                    });
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

/// One chunk out per unit in, unchanged.
struct PassthroughBackend {
    kind: TrackKind,
}

impl EncodeBackend for PassthroughBackend {
    fn encode(&mut self, unit: RawUnit) -> RecorderResult<Vec<EncodedChunk>> {
        Ok(vec![EncodedChunk {
            track: self.kind,
            pts_ns: unit.pts_ns,
            keyframe: true,
            payload: unit.payload,
        }])
    }

    fn finish(&mut self) -> RecorderResult<Vec<EncodedChunk>> {
        Ok(Vec::new())
    }
}

/// Records everything that reaches the container.
#[derive(Clone, Default)]
struct MemorySinkState {
    chunks: Arc<Mutex<Vec<EncodedChunk>>>,
    finalized: Arc<AtomicBool>,
}

impl MemorySinkState {
    fn chunks_for(&self, kind: TrackKind) -> Vec<u64> {
        self.chunks
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .iter()
            .filter(|c| c.track == kind)
            .map(|c| c.pts_ns)
            .collect()
    }
}

struct MemorySink {
    state: MemorySinkState,
}

impl ContainerSink for MemorySink {
    fn write(&mut self, chunk: EncodedChunk) -> RecorderResult<()> {
        self.state
            .chunks
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(chunk);
        Ok(())
    }

    fn finalize(&mut self) -> RecorderResult<()> {
        self.state.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend with failure knobs for every scripted scenario.
struct ScriptedBackend {
    screen_frames: u32,
    video_interrupt: Option<&'static str>,
    mic_buffers: u32,
    mic_interrupt: Option<&'static str>,
    mic_open_fails: bool,
    system_audio_encoder_fails: bool,
    sink_state: MemorySinkState,
}

impl ScriptedBackend {
    fn healthy() -> Self {
        Self {
            screen_frames: 10,
            video_interrupt: None,
            mic_buffers: 10,
            mic_interrupt: None,
            mic_open_fails: false,
            system_audio_encoder_fails: false,
            sink_state: MemorySinkState::default(),
        }
    }
}

impl CaptureBackend for ScriptedBackend {
    fn ensure_screen_access(&self) -> RecorderResult<()> {
        Ok(())
    }

    fn probe_microphone(&self) -> RecorderResult<()> {
        Ok(())
    }

    fn refresh_sources(&self, _config: &CaptureConfiguration) -> RecorderResult<SourceCatalog> {
        Ok(SourceCatalog {
            displays: vec![DisplayInfo {
                id: 0,
                name: "scripted".to_string(),
                width: 1280,
                height: 720,
                x: 0,
                y: 0,
                primary: true,
            }],
            windows: Vec::new(),
        })
    }

    fn open_screen_source(
        &self,
        _selection: &ResolvedSelection,
        _config: &CaptureConfiguration,
        capture_system_audio: bool,
    ) -> RecorderResult<Box<dyn CaptureSource>> {
        Ok(Box::new(ScriptedSource::screen(
            self.screen_frames,
            capture_system_audio,
            self.video_interrupt,
        )))
    }

    fn open_mic_source(&self, _sample_rate: u32) -> RecorderResult<Box<dyn CaptureSource>> {
        if self.mic_open_fails {
            return Err(RecorderError::mic_unavailable("no input device"));
        }
        Ok(Box::new(ScriptedSource::mic(
            self.mic_buffers,
            self.mic_interrupt,
        )))
    }

    fn encoder_backend(&self, spec: &TrackSpec) -> RecorderResult<Box<dyn EncodeBackend>> {
        if self.system_audio_encoder_fails && spec.kind == TrackKind::SystemAudio {
            return Err(RecorderError::encoder_init(
                spec.kind.as_str(),
                "codec initialization failed",
            ));
        }
        Ok(Box::new(PassthroughBackend { kind: spec.kind }))
    }

    fn container_sink(
        &self,
        _path: &Path,
        _container: VideoContainer,
        _specs: &[TrackSpec],
    ) -> RecorderResult<Box<dyn ContainerSink>> {
        Ok(Box::new(MemorySink {
            state: self.sink_state.clone(),
        }))
    }
}

fn test_config(record_mic: bool) -> CaptureConfiguration {
    CaptureConfiguration {
        source: SourceSelection::Display(0),
        record_mic,
        output_directory: std::env::temp_dir(),
        ..Default::default()
    }
}

fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn strictly_increasing(pts: &[u64]) -> bool {
    pts.windows(2).all(|w| w[0] < w[1])
}

// -------------------------------------------------------------------
// Lifecycle properties
// -------------------------------------------------------------------

#[test]
fn empty_recording_start_then_stop_finalizes() {
    let _guard = session_lock();
    let backend = ScriptedBackend {
        screen_frames: 0,
        ..ScriptedBackend::healthy()
    };
    let finalized = Arc::clone(&backend.sink_state.finalized);

    let session = RecordingSession::with_backend(test_config(false), Box::new(backend));
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Recording);

    let result = session.stop().unwrap();
    assert!(matches!(result, SessionResult::Finalized { .. }));
    assert_eq!(session.state(), SessionState::Finalized);
    assert!(finalized.load(Ordering::SeqCst));
}

#[test]
fn frames_reach_container_in_order() {
    let _guard = session_lock();
    let backend = ScriptedBackend::healthy();
    let sink_state = backend.sink_state.clone();

    let session = RecordingSession::with_backend(test_config(true), Box::new(backend));
    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    let result = session.stop().unwrap();

    assert!(matches!(result, SessionResult::Finalized { .. }));

    let video = sink_state.chunks_for(TrackKind::Video);
    let system = sink_state.chunks_for(TrackKind::SystemAudio);
    let mic = sink_state.chunks_for(TrackKind::Mic);
    assert!(!video.is_empty());
    assert!(!system.is_empty());
    assert!(!mic.is_empty());
    assert!(strictly_increasing(&video));
    assert!(strictly_increasing(&system));
    assert!(strictly_increasing(&mic));

    if let SessionResult::Finalized { summary, .. } = result {
        let video_track = summary
            .tracks
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .unwrap();
        assert_eq!(video_track.chunks as usize, video.len());
    }
}

#[test]
fn elapsed_is_reported_while_recording() {
    let _guard = session_lock();
    let session =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    assert_eq!(session.elapsed_secs(), 0.0);
    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(session.elapsed_secs() > 0.0);
    session.stop().unwrap();
}

#[test]
fn mic_unavailable_at_open_degrades_session() {
    let _guard = session_lock();
    let backend = ScriptedBackend {
        mic_open_fails: true,
        ..ScriptedBackend::healthy()
    };
    let sink_state = backend.sink_state.clone();

    let session = RecordingSession::with_backend(test_config(true), Box::new(backend));
    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let result = session.stop().unwrap();

    match result {
        SessionResult::FinalizedWithWarnings { degraded, .. } => {
            assert!(degraded.iter().any(|d| d.track == TrackKind::Mic));
        }
        other => panic!("expected FinalizedWithWarnings, got {other:?}"),
    }
    // Video and system audio made it; the mic track is absent.
    assert!(!sink_state.chunks_for(TrackKind::Video).is_empty());
    assert!(!sink_state.chunks_for(TrackKind::SystemAudio).is_empty());
    assert!(sink_state.chunks_for(TrackKind::Mic).is_empty());
}

#[test]
fn mic_failure_mid_session_degrades_not_fails() {
    let _guard = session_lock();
    let backend = ScriptedBackend {
        mic_buffers: 3,
        mic_interrupt: Some("device vanished"),
        ..ScriptedBackend::healthy()
    };

    let session = RecordingSession::with_backend(test_config(true), Box::new(backend));
    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let result = session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Finalized);
    match result {
        SessionResult::FinalizedWithWarnings { degraded, .. } => {
            let mic = degraded.iter().find(|d| d.track == TrackKind::Mic).unwrap();
            assert!(mic.reason.contains("device vanished"));
        }
        other => panic!("expected FinalizedWithWarnings, got {other:?}"),
    }
}

#[test]
fn video_failure_mid_session_fails_the_session() {
    let _guard = session_lock();
    let backend = ScriptedBackend {
        screen_frames: 3,
        video_interrupt: Some("display disconnected"),
        ..ScriptedBackend::healthy()
    };

    let session = RecordingSession::with_backend(test_config(false), Box::new(backend));
    session.start().unwrap();

    // The supervisor takes the abort path: Recording -> Stopping.
    wait_for("abort transition", || {
        session.state() == SessionState::Stopping
    });

    let result = session.stop().unwrap();
    match result {
        SessionResult::Failed { reason } => assert!(reason.contains("display disconnected")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn stop_twice_returns_the_stored_result() {
    let _guard = session_lock();
    let session =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    session.start().unwrap();
    let first = session.stop().unwrap();
    let second = session.stop().unwrap();
    assert!(matches!(first, SessionResult::Finalized { .. }));
    assert!(matches!(second, SessionResult::Finalized { .. }));
}

#[test]
fn video_encoder_init_failure_fails_start() {
    let _guard = session_lock();

    struct VideoEncoderFails {
        inner: ScriptedBackend,
    }

    impl CaptureBackend for VideoEncoderFails {
        fn ensure_screen_access(&self) -> RecorderResult<()> {
            self.inner.ensure_screen_access()
        }
        fn probe_microphone(&self) -> RecorderResult<()> {
            self.inner.probe_microphone()
        }
        fn refresh_sources(&self, config: &CaptureConfiguration) -> RecorderResult<SourceCatalog> {
            self.inner.refresh_sources(config)
        }
        fn open_screen_source(
            &self,
            selection: &ResolvedSelection,
            config: &CaptureConfiguration,
            capture_system_audio: bool,
        ) -> RecorderResult<Box<dyn CaptureSource>> {
            self.inner
                .open_screen_source(selection, config, capture_system_audio)
        }
        fn open_mic_source(&self, sample_rate: u32) -> RecorderResult<Box<dyn CaptureSource>> {
            self.inner.open_mic_source(sample_rate)
        }
        fn encoder_backend(&self, spec: &TrackSpec) -> RecorderResult<Box<dyn EncodeBackend>> {
            if spec.kind == TrackKind::Video {
                return Err(RecorderError::encoder_init("video", "no such codec"));
            }
            self.inner.encoder_backend(spec)
        }
        fn container_sink(
            &self,
            path: &Path,
            container: VideoContainer,
            specs: &[TrackSpec],
        ) -> RecorderResult<Box<dyn ContainerSink>> {
            self.inner.container_sink(path, container, specs)
        }
    }

    let session = RecordingSession::with_backend(
        test_config(false),
        Box::new(VideoEncoderFails {
            inner: ScriptedBackend::healthy(),
        }),
    );
    let err = session.start().unwrap_err();
    assert!(matches!(err, RecorderError::EncoderInit { .. }));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        session.result(),
        Some(SessionResult::Failed { .. })
    ));
}

#[test]
fn audio_encoder_init_failure_only_drops_that_track() {
    let _guard = session_lock();
    let backend = ScriptedBackend {
        system_audio_encoder_fails: true,
        ..ScriptedBackend::healthy()
    };
    let sink_state = backend.sink_state.clone();

    let session = RecordingSession::with_backend(test_config(false), Box::new(backend));
    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let result = session.stop().unwrap();

    match result {
        SessionResult::FinalizedWithWarnings { degraded, .. } => {
            assert!(degraded.iter().any(|d| d.track == TrackKind::SystemAudio));
        }
        other => panic!("expected FinalizedWithWarnings, got {other:?}"),
    }
    assert!(!sink_state.chunks_for(TrackKind::Video).is_empty());
    assert!(sink_state.chunks_for(TrackKind::SystemAudio).is_empty());
}

#[test]
fn only_one_session_records_per_process() {
    let _guard = session_lock();
    let first =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    first.start().unwrap();

    let second =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    let err = second.start().unwrap_err();
    assert!(err.to_string().contains("active"));

    first.stop().unwrap();

    // Once the first finished, a new session may record.
    let third =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    third.start().unwrap();
    third.stop().unwrap();
}

#[test]
fn invalid_output_directory_fails_start() {
    let _guard = session_lock();
    let config = CaptureConfiguration {
        output_directory: std::path::PathBuf::from("/nonexistent/reelcap-it"),
        ..test_config(false)
    };
    let session = RecordingSession::with_backend(config, Box::new(ScriptedBackend::healthy()));
    let err = session.start().unwrap_err();
    assert!(matches!(err, RecorderError::Config { .. }));
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn stop_before_start_is_an_error() {
    let session =
        RecordingSession::with_backend(test_config(false), Box::new(ScriptedBackend::healthy()));
    assert!(session.stop().is_err());
}
