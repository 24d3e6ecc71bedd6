//! Recording session management.
//!
//! The session is the single owner of a recording's lifecycle: it
//! resolves the capture configuration against the source catalog, wires
//! capture sources to per-track encoders and the multiplexer, normalizes
//! timestamps across clock domains, and contains track failures so that
//! one dying track never takes down its siblings unless it is the video
//! track.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use reelcap_common::clock::{DomainAnchor, RecordingClock, TrackDrift};
use reelcap_common::config::{AudioFormat, CaptureConfiguration, SourceSelection, VideoCodec};
use reelcap_common::error::{RecorderError, RecorderResult};
use reelcap_platform::SourceCatalog;

use crate::backend::{default_backend, CaptureBackend};
use crate::encoder::{EncodeBackend, EncoderReport, EncoderSettings, EncoderSink, TrackEncoder};
use crate::muxer::{FileSummary, Multiplexer};
use crate::source::{SourceEvent, SourceSink};
use crate::track::{TrackCodec, TrackEvent, TrackKind, TrackSpec};

/// Only one session may be recording per process.
static ACTIVE_SESSION: AtomicBool = AtomicBool::new(false);

/// Bounded wait for the multiplexer to flush pending chunks at stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Startup skew between tracks worth warning about.
const DRIFT_WARN_THRESHOLD_MS: f64 = 100.0;

/// Audio sample rate for both audio tracks.
const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Pipelines are being opened.
    Starting,
    /// Recording in progress.
    Recording,
    /// Capture halted, encoders draining, writer finalizing.
    Stopping,
    /// Output file finalized and playable.
    Finalized,
    /// Session aborted; no usable recording was produced.
    Failed,
}

/// A non-mandatory track that failed or was unavailable and was omitted
/// without aborting the session.
#[derive(Debug, Clone)]
pub struct DegradedTrack {
    pub track: TrackKind,
    pub reason: String,
}

/// Terminal outcome of a recording session.
#[derive(Debug, Clone)]
pub enum SessionResult {
    /// Every active track made it into the file.
    Finalized { path: PathBuf, summary: FileSummary },

    /// The file is playable but one or more tracks degraded, or the
    /// final drain timed out.
    FinalizedWithWarnings {
        path: PathBuf,
        summary: FileSummary,
        degraded: Vec<DegradedTrack>,
    },

    /// No usable recording.
    Failed { reason: String },
}

/// The capture target resolved against the source catalog.
#[derive(Debug, Clone)]
pub struct ResolvedSelection {
    pub target: SelectionTarget,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

#[derive(Debug, Clone)]
pub enum SelectionTarget {
    Display { x: i32, y: i32 },
    Window { id: u64 },
}

struct SessionShared {
    state: Mutex<SessionState>,
    degraded: Mutex<Vec<DegradedTrack>>,
    fatal: Mutex<Option<String>>,
    supervisor_stop: AtomicBool,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "Session state transition");
        *state = next;
    }

    fn add_degraded(&self, track: TrackKind, reason: impl Into<String>) {
        let mut degraded = self.degraded.lock().unwrap_or_else(PoisonError::into_inner);
        if degraded.iter().all(|d| d.track != track) {
            degraded.push(DegradedTrack {
                track,
                reason: reason.into(),
            });
        }
    }

    fn set_fatal(&self, reason: impl Into<String>) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(reason.into());
        }
    }
}

struct ActivePipelines {
    screen_source: Box<dyn crate::source::CaptureSource>,
    mic_source: Option<Box<dyn crate::source::CaptureSource>>,
    encoders: Vec<TrackEncoder>,
    muxer: Multiplexer,
    output_path: PathBuf,
    anchors: Vec<(TrackKind, Arc<Mutex<DomainAnchor>>)>,
    events_tx: Sender<TrackEvent>,
}

/// Orchestrates one recording from `start` to a terminal result.
pub struct RecordingSession {
    config: CaptureConfiguration,
    backend: Box<dyn CaptureBackend>,
    shared: Arc<SessionShared>,
    inner: Arc<Mutex<Option<ActivePipelines>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    clock: Mutex<Option<RecordingClock>>,
    result: Mutex<Option<SessionResult>>,
    holds_guard: AtomicBool,
}

impl RecordingSession {
    /// Create a session with the platform default media backend.
    pub fn new(config: CaptureConfiguration) -> Self {
        Self::with_backend(config, default_backend())
    }

    /// Create a session with an explicit backend (used by tests).
    pub fn with_backend(config: CaptureConfiguration, backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            config,
            backend,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
                degraded: Mutex::new(Vec::new()),
                fatal: Mutex::new(None),
                supervisor_stop: AtomicBool::new(false),
            }),
            inner: Arc::new(Mutex::new(None)),
            supervisor: Mutex::new(None),
            clock: Mutex::new(None),
            result: Mutex::new(None),
            holds_guard: AtomicBool::new(false),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Recording duration so far, for display while recording.
    pub fn elapsed_secs(&self) -> f64 {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.elapsed_secs())
            .unwrap_or(0.0)
    }

    /// The terminal result, once the session has finished.
    pub fn result(&self) -> Option<SessionResult> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start recording.
    ///
    /// Validates the configuration, resolves the capture target, checks
    /// permissions, opens every pipeline, and flips to `Recording`.
    /// Mandatory failures leave the session `Failed`; a missing mic only
    /// degrades it.
    pub fn start(&self) -> RecorderResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != SessionState::Idle {
                return Err(RecorderError::capture("Session already started"));
            }
            *state = SessionState::Starting;
        }

        tracing::info!("Starting recording session");

        let started_at = chrono::Local::now();
        let output_path = self.config.output_path(started_at);

        let opened = self.open_pipelines(&output_path).and_then(|parts| {
            let shared = Arc::clone(&self.shared);
            let supervisor_inner = Arc::clone(&self.inner);
            let (pipelines, clock, events_rx) = parts;
            let handle = std::thread::Builder::new()
                .name("session-supervisor".to_string())
                .spawn(move || run_supervisor(events_rx, shared, supervisor_inner))
                .map_err(|e| RecorderError::capture(format!("supervisor spawn failed: {e}")))?;
            Ok((pipelines, clock, handle))
        });

        match opened {
            Ok((pipelines, clock, handle)) => {
                tracing::info!(
                    output = %pipelines.output_path.display(),
                    epoch_wall = %clock.epoch_wall(),
                    "Recording started"
                );

                *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = Some(clock);
                *inner = Some(pipelines);
                *self
                    .supervisor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);

                self.shared.set_state(SessionState::Recording);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Session start failed");
                self.cleanup_partial(&output_path);
                self.release_guard();
                self.shared.set_state(SessionState::Failed);
                *self.result.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(SessionResult::Failed {
                        reason: e.to_string(),
                    });
                Err(e)
            }
        }
    }

    /// Stop recording and produce the terminal result.
    ///
    /// Safe to call from any state reachable after `start()` returns,
    /// including concurrently with an in-flight failure transition; a
    /// second caller observes the stored terminal result.
    pub fn stop(&self) -> RecorderResult<SessionResult> {
        if let Some(result) = self.result() {
            return Ok(result);
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the mutation lock: a concurrent stop may have
        // completed while we waited.
        if let Some(result) = self.result() {
            return Ok(result);
        }
        let Some(mut pipelines) = inner.take() else {
            return Err(RecorderError::capture("Session not started"));
        };

        self.shared.set_state(SessionState::Stopping);
        tracing::info!(duration_secs = self.elapsed_secs(), "Stopping recording session");

        // Stop capture first: no new raw units are admitted past here.
        if let Err(e) = pipelines.screen_source.stop() {
            tracing::warn!(error = %e, "Screen source stop failed");
        }
        if let Some(ref mut mic) = pipelines.mic_source {
            if let Err(e) = mic.stop() {
                tracing::warn!(error = %e, "Mic source stop failed");
            }
        }

        // Drain every encoder; the tail of each track is flushed into
        // the multiplexer channel.
        let mut reports: Vec<EncoderReport> = Vec::new();
        for encoder in pipelines.encoders.drain(..) {
            let kind = encoder.kind();
            let report = encoder.drain();
            if let Some(ref err) = report.error {
                if kind.is_mandatory() {
                    self.shared.set_fatal(format!("{kind} encoder failed: {err}"));
                } else {
                    self.shared.add_degraded(kind, err.clone());
                }
            }
            tracing::debug!(
                track = %kind,
                encoded = report.encoded_units,
                dropped = report.dropped_units,
                "Encoder drained"
            );
            reports.push(report);
        }

        let finish_result = pipelines.muxer.finish(DRAIN_TIMEOUT);

        self.log_drift(&pipelines.anchors);

        let fatal = self
            .shared
            .fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let degraded = self
            .shared
            .degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let result = match (fatal, finish_result) {
            (Some(reason), _) => {
                self.cleanup_partial(&pipelines.output_path);
                SessionResult::Failed { reason }
            }
            (None, Err(e)) => {
                self.cleanup_partial(&pipelines.output_path);
                SessionResult::Failed {
                    reason: e.to_string(),
                }
            }
            (None, Ok(mut summary)) => {
                for report in &reports {
                    if let Some(track) = summary.track_mut(report.kind) {
                        track.dropped_units = report.dropped_units + report.rejected_units;
                    }
                }
                let path = summary.path.clone();
                if degraded.is_empty() && !summary.partially_complete {
                    SessionResult::Finalized { path, summary }
                } else {
                    SessionResult::FinalizedWithWarnings {
                        path,
                        summary,
                        degraded,
                    }
                }
            }
        };

        drop(pipelines);

        match result {
            SessionResult::Failed { .. } => self.shared.set_state(SessionState::Failed),
            _ => self.shared.set_state(SessionState::Finalized),
        }
        self.release_guard();
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());

        // Release the mutation lock before reaping the supervisor: its
        // degrade path takes the same lock and must not deadlock with
        // this join.
        drop(inner);
        self.shared.supervisor_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }

        tracing::info!("Recording session finished");
        Ok(result)
    }

    // Internal helpers

    #[allow(clippy::type_complexity)]
    fn open_pipelines(
        &self,
        output_path: &Path,
    ) -> RecorderResult<(ActivePipelines, RecordingClock, Receiver<TrackEvent>)> {
        let config = &self.config;
        config.validate()?;
        self.backend.ensure_screen_access()?;

        let catalog = self.backend.refresh_sources(config)?;
        let selection = resolve_selection(&catalog, &config.source)?;
        tracing::info!(
            target = %selection.label,
            width = selection.width,
            height = selection.height,
            "Capture target resolved"
        );

        if ACTIVE_SESSION
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RecorderError::capture(
                "Another recording session is active in this process",
            ));
        }
        self.holds_guard.store(true, Ordering::SeqCst);

        let clock = RecordingClock::start();

        // Mic availability is probed before anything opens; denial
        // degrades the session instead of aborting it.
        let mut mic_wanted = config.record_mic;
        if mic_wanted {
            if let Err(e) = self.backend.probe_microphone() {
                tracing::warn!(error = %e, "Microphone unavailable; mic track degraded");
                self.shared.add_degraded(TrackKind::Mic, e.to_string());
                mic_wanted = false;
            }
        }

        let mut specs = vec![
            TrackSpec {
                kind: TrackKind::Video,
                codec: video_codec(config, &selection),
            },
            TrackSpec {
                kind: TrackKind::SystemAudio,
                codec: audio_codec(config),
            },
        ];
        if mic_wanted {
            specs.push(TrackSpec {
                kind: TrackKind::Mic,
                codec: audio_codec(config),
            });
        }

        // Codec initialization is track-scoped: video failure aborts,
        // audio failure drops the track before the container opens.
        let mut track_backends: Vec<(TrackSpec, Box<dyn EncodeBackend>)> = Vec::new();
        for spec in specs {
            match self.backend.encoder_backend(&spec) {
                Ok(enc) => track_backends.push((spec, enc)),
                Err(e) => {
                    if spec.kind.is_mandatory() {
                        return Err(e);
                    }
                    tracing::warn!(track = %spec.kind, error = %e, "Audio encoder unavailable; track degraded");
                    self.shared.add_degraded(spec.kind, e.to_string());
                }
            }
        }

        let final_specs: Vec<TrackSpec> =
            track_backends.iter().map(|(spec, _)| spec.clone()).collect();
        let system_audio_active = final_specs
            .iter()
            .any(|s| s.kind == TrackKind::SystemAudio);
        let mic_active = final_specs.iter().any(|s| s.kind == TrackKind::Mic);

        let sink = self
            .backend
            .container_sink(output_path, config.container, &final_specs)?;
        let muxer = Multiplexer::open(output_path, &final_specs, sink)?;

        let (events_tx, events_rx) = mpsc::channel();

        let mut encoders = Vec::new();
        let mut sinks: HashMap<TrackKind, EncoderSink> = HashMap::new();
        for (spec, enc) in track_backends {
            let encoder = TrackEncoder::spawn(
                spec.kind,
                enc,
                EncoderSettings::default(),
                muxer.sender()?,
                events_tx.clone(),
            )?;
            sinks.insert(spec.kind, encoder.sink());
            encoders.push(encoder);
        }

        // Per-track clock-domain anchors, shared with the sink closures
        // and read back at stop time for the drift check.
        let mut anchors: Vec<(TrackKind, Arc<Mutex<DomainAnchor>>)> = Vec::new();
        let mut anchor_for = |kind: TrackKind| {
            let anchor = Arc::new(Mutex::new(DomainAnchor::new()));
            anchors.push((kind, Arc::clone(&anchor)));
            anchor
        };

        let video_anchor = anchor_for(TrackKind::Video);
        let system_anchor = system_audio_active.then(|| anchor_for(TrackKind::SystemAudio));
        let mic_anchor = mic_active.then(|| anchor_for(TrackKind::Mic));

        // Screen source: mandatory. Its sink normalizes timestamps and
        // forwards interruptions as video-track events.
        let mut screen_source =
            self.backend
                .open_screen_source(&selection, config, system_audio_active)?;
        let screen_sink = make_screen_sink(
            clock.clone(),
            sinks.get(&TrackKind::Video).cloned(),
            video_anchor,
            system_audio_active
                .then(|| sinks.get(&TrackKind::SystemAudio).cloned())
                .flatten(),
            system_anchor,
            events_tx.clone(),
        );
        screen_source.start(screen_sink)?;

        // Mic source: optional and degradable, on its own clock domain.
        let mut mic_source: Option<Box<dyn crate::source::CaptureSource>> = None;
        if mic_active {
            match self.backend.open_mic_source(AUDIO_SAMPLE_RATE) {
                Ok(mut source) => {
                    let mic_sink = make_mic_sink(
                        clock.clone(),
                        sinks.get(&TrackKind::Mic).cloned(),
                        mic_anchor,
                        events_tx.clone(),
                    );
                    match source.start(mic_sink) {
                        Ok(()) => mic_source = Some(source),
                        Err(e) => {
                            tracing::warn!(error = %e, "Mic capture start failed; track degraded");
                            self.shared.add_degraded(TrackKind::Mic, e.to_string());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Mic capture unavailable; track degraded");
                    self.shared.add_degraded(TrackKind::Mic, e.to_string());
                }
            }
        }

        Ok((
            ActivePipelines {
                screen_source,
                mic_source,
                encoders,
                muxer,
                output_path: output_path.to_path_buf(),
                anchors,
                events_tx,
            },
            clock,
            events_rx,
        ))
    }

    fn log_drift(&self, anchors: &[(TrackKind, Arc<Mutex<DomainAnchor>>)]) {
        let anchored = |kind: TrackKind| {
            anchors.iter().find(|(k, _)| *k == kind).and_then(|(_, a)| {
                a.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .anchored_at_ns()
            })
        };

        let Some(reference_ns) = anchored(TrackKind::Video) else {
            return;
        };

        for kind in [TrackKind::SystemAudio, TrackKind::Mic] {
            let Some(measured_ns) = anchored(kind) else {
                continue;
            };
            let drift = TrackDrift {
                reference_ns,
                measured_ns,
            };
            if drift.exceeds_threshold_ms(DRIFT_WARN_THRESHOLD_MS) {
                tracing::warn!(track = %kind, drift_ms = drift.drift_ms(), "Track start drift exceeds 100ms");
            } else {
                tracing::debug!(track = %kind, drift_ms = drift.drift_ms(), "Track start drift within threshold");
            }
        }
    }

    fn cleanup_partial(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        if self.config.keep_partial_output {
            tracing::warn!(path = %path.display(), "Keeping partially written output file");
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Removed partial output file"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output")
            }
        }
    }

    fn release_guard(&self) {
        if self.holds_guard.swap(false, Ordering::SeqCst) {
            ACTIVE_SESSION.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        // Best effort: a session dropped mid-recording still halts
        // capture and releases the process guard.
        if self.result().is_none() && self.shared.state() == SessionState::Recording {
            let _ = self.stop();
        }
        self.release_guard();
    }
}

fn run_supervisor(
    events: Receiver<TrackEvent>,
    shared: Arc<SessionShared>,
    inner: Arc<Mutex<Option<ActivePipelines>>>,
) {
    while !shared.supervisor_stop.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let track = event.track();
        let message = event.message().to_string();

        if track.is_mandatory() {
            tracing::error!(%track, message, "Mandatory track failed; aborting session");
            let error = match &event {
                TrackEvent::SourceInterrupted { .. } => {
                    RecorderError::source_interrupted(track.as_str(), &message)
                }
                TrackEvent::EncoderFailed { .. } => {
                    RecorderError::capture(format!("{track} encoder failed: {message}"))
                }
            };
            shared.set_fatal(error.to_string());
            // Abort path: only mark the transition; teardown runs in
            // stop(), which is safe to call concurrently.
            let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SessionState::Recording {
                *state = SessionState::Stopping;
            }
        } else {
            tracing::warn!(%track, message, "Track degraded; session continues");
            shared.add_degraded(track, message);
            if track == TrackKind::Mic {
                // Stop only the affected pipeline; siblings keep going.
                let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(pipelines) = guard.as_mut() {
                    if let Some(ref mut mic) = pipelines.mic_source {
                        if let Err(e) = mic.stop() {
                            tracing::warn!(error = %e, "Degraded mic source stop failed");
                        }
                    }
                }
            }
        }
    }
}

fn make_screen_sink(
    clock: RecordingClock,
    video_sink: Option<EncoderSink>,
    video_anchor: Arc<Mutex<DomainAnchor>>,
    system_sink: Option<EncoderSink>,
    system_anchor: Option<Arc<Mutex<DomainAnchor>>>,
    events: Sender<TrackEvent>,
) -> SourceSink {
    Box::new(move |event| match event {
        SourceEvent::Video(mut unit) => {
            if let Some(ref sink) = video_sink {
                let now = clock.elapsed_ns();
                unit.pts_ns = video_anchor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .normalize(unit.pts_ns, now);
                sink.push(unit);
            }
        }
        SourceEvent::Audio(mut unit) => {
            if let (Some(sink), Some(anchor)) = (system_sink.as_ref(), system_anchor.as_ref()) {
                let now = clock.elapsed_ns();
                unit.pts_ns = anchor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .normalize(unit.pts_ns, now);
                sink.push(unit);
            }
        }
        SourceEvent::Interrupted { message } => {
            events
                .send(TrackEvent::SourceInterrupted {
                    track: TrackKind::Video,
                    message,
                })
                .ok();
        }
        SourceEvent::Ended => {}
    })
}

fn make_mic_sink(
    clock: RecordingClock,
    mic_sink: Option<EncoderSink>,
    mic_anchor: Option<Arc<Mutex<DomainAnchor>>>,
    events: Sender<TrackEvent>,
) -> SourceSink {
    Box::new(move |event| match event {
        SourceEvent::Audio(mut unit) | SourceEvent::Video(mut unit) => {
            if let (Some(sink), Some(anchor)) = (mic_sink.as_ref(), mic_anchor.as_ref()) {
                let now = clock.elapsed_ns();
                unit.pts_ns = anchor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .normalize(unit.pts_ns, now);
                sink.push(unit);
            }
        }
        SourceEvent::Interrupted { message } => {
            events
                .send(TrackEvent::SourceInterrupted {
                    track: TrackKind::Mic,
                    message,
                })
                .ok();
        }
        SourceEvent::Ended => {}
    })
}

/// Resolve the configured source against the current catalog.
fn resolve_selection(
    catalog: &SourceCatalog,
    source: &SourceSelection,
) -> RecorderResult<ResolvedSelection> {
    match source {
        SourceSelection::Display(id) => {
            // A missing display id falls back to the primary display;
            // catalogs are guaranteed non-empty by the enumerator.
            let display = catalog
                .display(*id)
                .or_else(|| catalog.displays.iter().find(|d| d.primary))
                .or_else(|| catalog.displays.first())
                .ok_or_else(|| RecorderError::enumeration("No displays available"))?;
            Ok(ResolvedSelection {
                target: SelectionTarget::Display {
                    x: display.x,
                    y: display.y,
                },
                width: display.width,
                height: display.height,
                label: display.name.clone(),
            })
        }
        SourceSelection::Window(id) => {
            let window = catalog.window(*id).ok_or_else(|| {
                RecorderError::capture(format!("Selected window {id:#x} is no longer on screen"))
            })?;
            Ok(ResolvedSelection {
                target: SelectionTarget::Window { id: window.id },
                // Window geometry is negotiated by the capture source;
                // the encoder is configured from the window's own size
                // at first frame, so use a safe default here.
                width: 1920,
                height: 1080,
                label: format!("{} ({})", window.title, window.app_id),
            })
        }
    }
}

fn video_codec(config: &CaptureConfiguration, selection: &ResolvedSelection) -> TrackCodec {
    match config.video_codec {
        VideoCodec::H264 => TrackCodec::H264 {
            width: selection.width,
            height: selection.height,
            fps: config.frame_rate,
        },
        VideoCodec::H265 => TrackCodec::H265 {
            width: selection.width,
            height: selection.height,
            fps: config.frame_rate,
        },
    }
}

fn audio_codec(config: &CaptureConfiguration) -> TrackCodec {
    match config.effective_audio_format() {
        AudioFormat::Aac => TrackCodec::Aac {
            bitrate_kbps: config.audio_quality.bitrate_kbps(),
            sample_rate: AUDIO_SAMPLE_RATE,
        },
        AudioFormat::Opus => TrackCodec::Opus {
            bitrate_kbps: config.audio_quality.bitrate_kbps(),
            sample_rate: AUDIO_SAMPLE_RATE,
        },
        AudioFormat::Alac => TrackCodec::Alac {
            sample_rate: AUDIO_SAMPLE_RATE,
        },
        AudioFormat::Flac => TrackCodec::Flac {
            sample_rate: AUDIO_SAMPLE_RATE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcap_common::config::{AudioQuality, VideoContainer};
    use reelcap_platform::{DisplayInfo, WindowInfo};

    fn catalog() -> SourceCatalog {
        SourceCatalog {
            displays: vec![
                DisplayInfo {
                    id: 0,
                    name: "eDP-1".to_string(),
                    width: 1920,
                    height: 1080,
                    x: 0,
                    y: 0,
                    primary: true,
                },
                DisplayInfo {
                    id: 1,
                    name: "HDMI-1".to_string(),
                    width: 2560,
                    height: 1440,
                    x: 1920,
                    y: 0,
                    primary: false,
                },
            ],
            windows: vec![WindowInfo {
                id: 0x41,
                app_id: "firefox".to_string(),
                title: "Mozilla Firefox".to_string(),
            }],
        }
    }

    #[test]
    fn display_selection_resolves_geometry() {
        let resolved = resolve_selection(&catalog(), &SourceSelection::Display(1)).unwrap();
        assert!(matches!(
            resolved.target,
            SelectionTarget::Display { x: 1920, y: 0 }
        ));
        assert_eq!(resolved.width, 2560);
    }

    #[test]
    fn missing_display_falls_back_to_primary() {
        let resolved = resolve_selection(&catalog(), &SourceSelection::Display(9)).unwrap();
        assert_eq!(resolved.label, "eDP-1");
    }

    #[test]
    fn vanished_window_is_an_error() {
        let err = resolve_selection(&catalog(), &SourceSelection::Window(0x99)).unwrap_err();
        assert!(err.to_string().contains("no longer on screen"));
    }

    #[test]
    fn window_selection_resolves() {
        let resolved = resolve_selection(&catalog(), &SourceSelection::Window(0x41)).unwrap();
        assert!(matches!(
            resolved.target,
            SelectionTarget::Window { id: 0x41 }
        ));
    }

    #[test]
    fn audio_codec_applies_container_fallback() {
        let config = CaptureConfiguration {
            audio_format: AudioFormat::Opus,
            container: VideoContainer::Mp4,
            audio_quality: AudioQuality::Good,
            ..Default::default()
        };
        assert!(matches!(
            audio_codec(&config),
            TrackCodec::Aac {
                bitrate_kbps: 192,
                ..
            }
        ));

        let config = CaptureConfiguration {
            audio_format: AudioFormat::Opus,
            container: VideoContainer::Mov,
            ..Default::default()
        };
        assert!(matches!(audio_codec(&config), TrackCodec::Opus { .. }));
    }

    #[test]
    fn lossless_audio_ignores_quality() {
        let config = CaptureConfiguration {
            audio_format: AudioFormat::Flac,
            audio_quality: AudioQuality::Extreme,
            ..Default::default()
        };
        assert!(matches!(audio_codec(&config), TrackCodec::Flac { .. }));
    }
}
