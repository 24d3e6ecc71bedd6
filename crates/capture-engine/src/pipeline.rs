//! GStreamer pipeline construction for capture, encoding, and muxing.
//!
//! Three pipeline families live here:
//! - capture: `ximagesrc`/`pipewiresrc`/`pulsesrc` branches terminating
//!   in `appsink`, pushing raw units into the engine
//! - encode: `appsrc ! <codec> ! <parse> ! appsink` per track
//! - mux: one `appsrc` per track feeding `mp4mux`/`qtmux ! filesink`
//!
//! Everything behind the [`CaptureSource`], [`EncodeBackend`], and
//! [`ContainerSink`] traits, so the engine's queueing and state-machine
//! logic runs without GStreamer in tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use reelcap_common::config::{CaptureConfiguration, VideoContainer};
use reelcap_common::error::{RecorderError, RecorderResult};
use reelcap_platform::{detect_display_server, DisplayServer};

use crate::encoder::EncodeBackend;
use crate::muxer::ContainerSink;
use crate::session::{ResolvedSelection, SelectionTarget};
use crate::source::{CaptureSource, SourceEvent, SourceSink};
use crate::track::{EncodedChunk, RawUnit, TrackCodec, TrackKind, TrackSpec};

/// How long to wait for a pipeline to reach Playing.
const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for EOS to propagate on teardown.
const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn ensure_gst_init() -> RecorderResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(RecorderError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn launch_pipeline(name: &str, launch: &str) -> RecorderResult<gst::Pipeline> {
    ensure_gst_init()?;

    let element = gst::parse::launch(launch)
        .map_err(|e| RecorderError::capture(format!("Failed to build {name} pipeline: {e}")))?;

    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| RecorderError::capture(format!("{name} launch did not produce a pipeline")))
}

/// Move a pipeline to Playing and wait for the state change to land.
/// GStreamer state changes are async; without this wait the capture
/// source may not be open yet when we return.
fn start_pipeline(pipeline: &gst::Pipeline, name: &str) -> RecorderResult<()> {
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|e| RecorderError::capture(format!("Failed to start {name} pipeline: {e:?}")))?;

    let wait_result = pipeline.state(gst::ClockTime::from_seconds(
        STATE_CHANGE_TIMEOUT.as_secs(),
    ));
    match wait_result {
        (Ok(_), gst::State::Playing, _) => Ok(()),
        (Ok(_), state, _) => {
            tracing::warn!(
                pipeline = name,
                ?state,
                "Pipeline did not reach Playing state within timeout"
            );
            Ok(())
        }
        (Err(e), _, _) => Err(RecorderError::capture(format!(
            "{name} pipeline failed to reach Playing state: {e:?}"
        ))),
    }
}

/// Send EOS and wait for it to propagate so encoders/muxers can flush.
/// Without this, the tail of the recording may be truncated.
fn drain_eos(pipeline: &gst::Pipeline, name: &str) {
    let eos_sent = pipeline.send_event(gst::event::Eos::new());
    if !eos_sent {
        tracing::warn!(pipeline = name, "Failed to send EOS event; output may be truncated");
        return;
    }

    let Some(bus) = pipeline.bus() else { return };
    let deadline = EOS_DRAIN_TIMEOUT;
    let start = std::time::Instant::now();
    loop {
        let timeout_ns = {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                tracing::warn!(pipeline = name, "EOS drain timed out");
                break;
            }
            let remaining = deadline - elapsed;
            gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)
        };
        match bus.timed_pop(timeout_ns) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => {
                    tracing::debug!(pipeline = name, "EOS received; pipeline drained");
                    break;
                }
                gst::MessageView::Error(e) => {
                    tracing::warn!(
                        pipeline = name,
                        error = %e.error(),
                        "Pipeline error during EOS drain"
                    );
                    break;
                }
                _ => {}
            },
            None => {
                tracing::warn!(pipeline = name, "EOS drain timed out");
                break;
            }
        }
    }
}

fn shut_down(pipeline: &gst::Pipeline, name: &str) -> RecorderResult<()> {
    pipeline
        .set_state(gst::State::Null)
        .map_err(|e| RecorderError::capture(format!("Failed to stop {name} pipeline: {e:?}")))?;
    Ok(())
}

fn find_app_sink(pipeline: &gst::Pipeline, name: &str) -> RecorderResult<gst_app::AppSink> {
    pipeline
        .by_name(name)
        .ok_or_else(|| RecorderError::capture(format!("Pipeline has no element named {name}")))?
        .downcast::<gst_app::AppSink>()
        .map_err(|_| RecorderError::capture(format!("Element {name} is not an appsink")))
}

fn find_app_src(pipeline: &gst::Pipeline, name: &str) -> RecorderResult<gst_app::AppSrc> {
    pipeline
        .by_name(name)
        .ok_or_else(|| RecorderError::capture(format!("Pipeline has no element named {name}")))?
        .downcast::<gst_app::AppSrc>()
        .map_err(|_| RecorderError::capture(format!("Element {name} is not an appsrc")))
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

fn timestamped_buffer(
    payload: Vec<u8>,
    pts_ns: u64,
    delta_unit: bool,
) -> RecorderResult<gst::Buffer> {
    let mut buffer = gst::Buffer::from_mut_slice(payload);
    let buffer_ref = buffer
        .get_mut()
        .ok_or_else(|| RecorderError::capture("Freshly created buffer not writable"))?;
    buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts_ns));
    if delta_unit {
        buffer_ref.set_flags(gst::BufferFlags::DELTA_UNIT);
    }
    Ok(buffer)
}

/// Spawn a thread that forwards bus errors to the source sink as
/// interruption events (display unplugged, device vanished).
fn spawn_bus_watch(
    pipeline: &gst::Pipeline,
    name: &'static str,
    sink: Arc<SourceSink>,
    stop: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    let bus = pipeline.bus()?;
    std::thread::Builder::new()
        .name(format!("bus-{name}"))
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match bus.timed_pop(gst::ClockTime::from_mseconds(500)) {
                    Some(msg) => match msg.view() {
                        gst::MessageView::Error(e) => {
                            tracing::warn!(pipeline = name, error = %e.error(), "Capture pipeline error");
                            sink(SourceEvent::Interrupted {
                                message: e.error().to_string(),
                            });
                            break;
                        }
                        gst::MessageView::Eos(_) => {
                            sink(SourceEvent::Ended);
                            break;
                        }
                        _ => {}
                    },
                    None => {}
                }
            }
        })
        .ok()
}

// ---------------------------------------------------------------------
// Capture sources
// ---------------------------------------------------------------------

/// Screen capture source: video frames plus, optionally, system audio,
/// delivered from GStreamer streaming threads.
pub struct GstScreenSource {
    pipeline: gst::Pipeline,
    has_system_audio: bool,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
    running: bool,
}

impl GstScreenSource {
    pub fn open(
        selection: &ResolvedSelection,
        config: &CaptureConfiguration,
        capture_system_audio: bool,
    ) -> RecorderResult<Self> {
        let server = detect_display_server();
        let fps = config.frame_rate;
        let show_pointer = if config.show_cursor { "true" } else { "false" };

        let video_branch = match (server, &selection.target) {
            (DisplayServer::X11, SelectionTarget::Display { x, y }) => {
                let endx = x + selection.width as i32 - 1;
                let endy = y + selection.height as i32 - 1;
                format!(
                    "ximagesrc use-damage=false remote=true show-pointer={show_pointer} \
                     startx={x} starty={y} endx={endx} endy={endy} \
                     ! queue max-size-buffers=120 leaky=downstream \
                     ! videoconvert ! videoscale ! videorate \
                     ! video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 \
                     ! appsink name=videosink sync=false max-buffers=8 drop=true",
                    width = selection.width,
                    height = selection.height,
                )
            }
            (DisplayServer::X11, SelectionTarget::Window { id }) => {
                format!(
                    "ximagesrc xid={id} use-damage=false show-pointer={show_pointer} \
                     ! queue max-size-buffers=120 leaky=downstream \
                     ! videoconvert ! videoscale ! videorate \
                     ! video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 \
                     ! appsink name=videosink sync=false max-buffers=8 drop=true",
                    width = selection.width,
                    height = selection.height,
                )
            }
            (DisplayServer::Wayland, _) => format!(
                "pipewiresrc do-timestamp=true \
                 ! queue max-size-buffers=120 leaky=downstream \
                 ! videoconvert ! videoscale ! videorate \
                 ! video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 \
                 ! appsink name=videosink sync=false max-buffers=8 drop=true",
                width = selection.width,
                height = selection.height,
            ),
            (DisplayServer::Unknown, _) => {
                return Err(RecorderError::permission_denied(
                    "Unsupported display server (neither Wayland nor X11)",
                ));
            }
        };

        let launch = if capture_system_audio {
            format!(
                "{video_branch}  pulsesrc device=@DEFAULT_MONITOR@ do-timestamp=true \
                 ! audioconvert ! audioresample \
                 ! audio/x-raw,format=S16LE,rate=48000,channels=2,layout=interleaved \
                 ! appsink name=audiosink sync=false max-buffers=32 drop=true"
            )
        } else {
            video_branch
        };

        let pipeline = launch_pipeline("screen", &launch)?;

        Ok(Self {
            pipeline,
            has_system_audio: capture_system_audio,
            bus_stop: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
            running: false,
        })
    }
}

impl CaptureSource for GstScreenSource {
    fn start(&mut self, sink: SourceSink) -> RecorderResult<()> {
        let sink = Arc::new(sink);

        let video_sink = find_app_sink(&self.pipeline, "videosink")?;
        let video_cb = Arc::clone(&sink);
        video_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let unit = pull_raw_unit(appsink)?;
                    video_cb(SourceEvent::Video(unit));
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        if self.has_system_audio {
            let audio_sink = find_app_sink(&self.pipeline, "audiosink")?;
            let audio_cb = Arc::clone(&sink);
            audio_sink.set_callbacks(
                gst_app::AppSinkCallbacks::builder()
                    .new_sample(move |appsink| {
                        let unit = pull_raw_unit(appsink)?;
                        audio_cb(SourceEvent::Audio(unit));
                        Ok(gst::FlowSuccess::Ok)
                    })
                    .build(),
            );
        }

        self.bus_thread = spawn_bus_watch(
            &self.pipeline,
            "screen",
            Arc::clone(&sink),
            Arc::clone(&self.bus_stop),
        );

        start_pipeline(&self.pipeline, "screen")?;
        self.running = true;
        tracing::info!(system_audio = self.has_system_audio, "Screen capture started");
        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        self.bus_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }

        drain_eos(&self.pipeline, "screen");
        shut_down(&self.pipeline, "screen")
    }
}

impl Drop for GstScreenSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Microphone capture source on its own clock domain.
pub struct GstMicSource {
    pipeline: gst::Pipeline,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
    running: bool,
}

impl GstMicSource {
    pub fn open(sample_rate: u32) -> RecorderResult<Self> {
        let launch = format!(
            "pulsesrc do-timestamp=true \
             ! audioconvert ! audioresample \
             ! audio/x-raw,format=S16LE,rate={sample_rate},channels=2,layout=interleaved \
             ! appsink name=audiosink sync=false max-buffers=32 drop=true"
        );
        let pipeline = launch_pipeline("mic", &launch).map_err(|e| {
            RecorderError::mic_unavailable(format!("Failed to open microphone pipeline: {e}"))
        })?;

        Ok(Self {
            pipeline,
            bus_stop: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
            running: false,
        })
    }
}

impl CaptureSource for GstMicSource {
    fn start(&mut self, sink: SourceSink) -> RecorderResult<()> {
        let sink = Arc::new(sink);

        let audio_sink = find_app_sink(&self.pipeline, "audiosink")?;
        let audio_cb = Arc::clone(&sink);
        audio_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let unit = pull_raw_unit(appsink)?;
                    audio_cb(SourceEvent::Audio(unit));
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        self.bus_thread = spawn_bus_watch(
            &self.pipeline,
            "mic",
            Arc::clone(&sink),
            Arc::clone(&self.bus_stop),
        );

        start_pipeline(&self.pipeline, "mic")
            .map_err(|e| RecorderError::mic_unavailable(e.to_string()))?;
        self.running = true;
        tracing::info!("Microphone capture started");
        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        self.bus_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }

        drain_eos(&self.pipeline, "mic");
        shut_down(&self.pipeline, "mic")
    }
}

impl Drop for GstMicSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn pull_raw_unit(appsink: &gst_app::AppSink) -> Result<RawUnit, gst::FlowError> {
    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
    let pts_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(0);
    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
    Ok(RawUnit {
        pts_ns,
        payload: map.as_slice().to_vec(),
        dropped_before: 0,
    })
}

// ---------------------------------------------------------------------
// Encode backends
// ---------------------------------------------------------------------

/// Compression backend: `appsrc ! <codec> ! <parse> ! appsink`.
pub struct GstEncodeBackend {
    kind: TrackKind,
    pipeline: gst::Pipeline,
    src: gst_app::AppSrc,
    sink: gst_app::AppSink,
    last_input_pts: u64,
}

impl GstEncodeBackend {
    pub fn new(spec: &TrackSpec) -> RecorderResult<Self> {
        let launch = encode_launch(&spec.codec);
        let name = spec.kind.as_str();

        let pipeline = launch_pipeline(name, &launch)
            .map_err(|e| RecorderError::encoder_init(name, e.to_string()))?;
        let src = find_app_src(&pipeline, "src")
            .map_err(|e| RecorderError::encoder_init(name, e.to_string()))?;
        let sink = find_app_sink(&pipeline, "sink")
            .map_err(|e| RecorderError::encoder_init(name, e.to_string()))?;

        start_pipeline(&pipeline, name)
            .map_err(|e| RecorderError::encoder_init(name, e.to_string()))?;

        Ok(Self {
            kind: spec.kind,
            pipeline,
            src,
            sink,
            last_input_pts: 0,
        })
    }

    fn collect_ready(&mut self, out: &mut Vec<EncodedChunk>) {
        while let Some(sample) = self.sink.try_pull_sample(gst::ClockTime::ZERO) {
            if let Some(chunk) = chunk_from_sample(self.kind, &sample, self.last_input_pts) {
                out.push(chunk);
            }
        }
    }
}

impl EncodeBackend for GstEncodeBackend {
    fn encode(&mut self, unit: RawUnit) -> RecorderResult<Vec<EncodedChunk>> {
        self.last_input_pts = unit.pts_ns;
        let buffer = timestamped_buffer(unit.payload, unit.pts_ns, false)?;
        self.src.push_buffer(buffer).map_err(|e| {
            RecorderError::capture(format!("{} encoder rejected buffer: {e:?}", self.kind))
        })?;

        let mut chunks = Vec::new();
        self.collect_ready(&mut chunks);
        Ok(chunks)
    }

    fn finish(&mut self) -> RecorderResult<Vec<EncodedChunk>> {
        self.src.end_of_stream().map_err(|e| {
            RecorderError::capture(format!("{} encoder EOS failed: {e:?}", self.kind))
        })?;

        let mut chunks = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match self
                .sink
                .try_pull_sample(gst::ClockTime::from_mseconds(200))
            {
                Some(sample) => {
                    if let Some(chunk) = chunk_from_sample(self.kind, &sample, self.last_input_pts)
                    {
                        chunks.push(chunk);
                    }
                }
                None => {
                    if self.sink.is_eos() || std::time::Instant::now() >= deadline {
                        break;
                    }
                }
            }
        }

        shut_down(&self.pipeline, self.kind.as_str())?;
        Ok(chunks)
    }
}

fn chunk_from_sample(
    kind: TrackKind,
    sample: &gst::Sample,
    fallback_pts: u64,
) -> Option<EncodedChunk> {
    let buffer = sample.buffer()?;
    let pts_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(fallback_pts);
    let keyframe = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
    let map = buffer.map_readable().ok()?;
    Some(EncodedChunk {
        track: kind,
        pts_ns,
        keyframe,
        payload: map.as_slice().to_vec(),
    })
}

fn encode_launch(codec: &TrackCodec) -> String {
    match codec {
        TrackCodec::H264 { width, height, fps } => {
            // One keyframe every 2 seconds: reasonable seeking without
            // inflating file size.
            let keyint = fps.saturating_mul(2).max(2);
            format!(
                "appsrc name=src is-live=true format=time \
                 caps=video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 \
                 ! videoconvert \
                 ! x264enc tune=zerolatency speed-preset=veryfast key-int-max={keyint} \
                 ! h264parse config-interval=-1 \
                 ! video/x-h264,stream-format=byte-stream,alignment=au \
                 ! appsink name=sink sync=false"
            )
        }
        TrackCodec::H265 { width, height, fps } => {
            let keyint = fps.saturating_mul(2).max(2);
            format!(
                "appsrc name=src is-live=true format=time \
                 caps=video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 \
                 ! videoconvert \
                 ! x265enc speed-preset=veryfast key-int-max={keyint} \
                 ! h265parse config-interval=-1 \
                 ! video/x-h265,stream-format=byte-stream,alignment=au \
                 ! appsink name=sink sync=false"
            )
        }
        TrackCodec::Aac {
            bitrate_kbps,
            sample_rate,
        } => format!(
            "appsrc name=src is-live=true format=time \
             caps=audio/x-raw,format=S16LE,rate={sample_rate},channels=2,layout=interleaved \
             ! audioconvert ! avenc_aac bitrate={} \
             ! aacparse ! audio/mpeg,mpegversion=4,stream-format=adts \
             ! appsink name=sink sync=false",
            bitrate_kbps * 1000
        ),
        TrackCodec::Opus {
            bitrate_kbps,
            sample_rate,
        } => format!(
            "appsrc name=src is-live=true format=time \
             caps=audio/x-raw,format=S16LE,rate={sample_rate},channels=2,layout=interleaved \
             ! audioconvert ! audioresample ! opusenc bitrate={} \
             ! opusparse ! appsink name=sink sync=false",
            bitrate_kbps * 1000
        ),
        TrackCodec::Flac { sample_rate } => format!(
            "appsrc name=src is-live=true format=time \
             caps=audio/x-raw,format=S16LE,rate={sample_rate},channels=2,layout=interleaved \
             ! audioconvert ! flacenc ! flacparse \
             ! appsink name=sink sync=false"
        ),
        TrackCodec::Alac { sample_rate } => format!(
            "appsrc name=src is-live=true format=time \
             caps=audio/x-raw,format=S16LE,rate={sample_rate},channels=2,layout=interleaved \
             ! audioconvert ! avenc_alac \
             ! appsink name=sink sync=false"
        ),
    }
}

// ---------------------------------------------------------------------
// Container sink
// ---------------------------------------------------------------------

/// Container writer: one `appsrc` per track feeding the muxer.
pub struct GstContainerSink {
    pipeline: gst::Pipeline,
    srcs: HashMap<TrackKind, gst_app::AppSrc>,
    finalized: bool,
}

impl GstContainerSink {
    pub fn open(
        path: &Path,
        container: VideoContainer,
        specs: &[TrackSpec],
    ) -> RecorderResult<Self> {
        let location = escape_path(path);
        let mux_element = match container {
            VideoContainer::Mp4 => "mp4mux name=mux faststart=true",
            VideoContainer::Mov => "qtmux name=mux",
        };

        let mut launch = format!("{mux_element} ! filesink location=\"{location}\"");
        for spec in specs {
            let parse = mux_parse_element(&spec.codec);
            launch.push_str(&format!(
                "  appsrc name=src-{kind} is-live=true format=time \
                 ! {parse} ! queue ! mux.",
                kind = spec.kind.as_str()
            ));
        }

        let pipeline = launch_pipeline("mux", &launch)
            .map_err(|e| RecorderError::write(e.to_string()))?;

        let mut srcs = HashMap::new();
        for spec in specs {
            let src = find_app_src(&pipeline, &format!("src-{}", spec.kind.as_str()))
                .map_err(|e| RecorderError::write(e.to_string()))?;
            let caps = mux_caps(&spec.codec)
                .parse::<gst::Caps>()
                .map_err(|e| RecorderError::write(format!("Invalid caps for {}: {e}", spec.kind)))?;
            src.set_caps(Some(&caps));
            srcs.insert(spec.kind, src);
        }

        start_pipeline(&pipeline, "mux").map_err(|e| RecorderError::write(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Container pipeline opened");

        Ok(Self {
            pipeline,
            srcs,
            finalized: false,
        })
    }
}

impl ContainerSink for GstContainerSink {
    fn write(&mut self, chunk: EncodedChunk) -> RecorderResult<()> {
        let src = self.srcs.get(&chunk.track).ok_or_else(|| {
            RecorderError::write(format!("No container track for {}", chunk.track))
        })?;
        let buffer = timestamped_buffer(chunk.payload, chunk.pts_ns, !chunk.keyframe)
            .map_err(|e| RecorderError::write(e.to_string()))?;
        src.push_buffer(buffer)
            .map_err(|e| RecorderError::write(format!("Muxer rejected buffer: {e:?}")))?;
        Ok(())
    }

    fn finalize(&mut self) -> RecorderResult<()> {
        if self.finalized {
            return Err(RecorderError::AlreadyFinalized);
        }
        self.finalized = true;

        for (kind, src) in &self.srcs {
            if let Err(e) = src.end_of_stream() {
                tracing::warn!(track = %kind, error = ?e, "EOS push failed on mux input");
            }
        }

        drain_eos(&self.pipeline, "mux");
        shut_down(&self.pipeline, "mux").map_err(|e| RecorderError::write(e.to_string()))
    }
}

impl Drop for GstContainerSink {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

fn mux_parse_element(codec: &TrackCodec) -> &'static str {
    match codec {
        TrackCodec::H264 { .. } => "h264parse",
        TrackCodec::H265 { .. } => "h265parse",
        TrackCodec::Aac { .. } => "aacparse",
        TrackCodec::Opus { .. } => "opusparse",
        TrackCodec::Flac { .. } => "flacparse",
        TrackCodec::Alac { .. } => "identity",
    }
}

fn mux_caps(codec: &TrackCodec) -> String {
    match codec {
        TrackCodec::H264 { width, height, .. } => format!(
            "video/x-h264,stream-format=byte-stream,alignment=au,width={width},height={height}"
        ),
        TrackCodec::H265 { width, height, .. } => format!(
            "video/x-h265,stream-format=byte-stream,alignment=au,width={width},height={height}"
        ),
        TrackCodec::Aac { sample_rate, .. } => format!(
            "audio/mpeg,mpegversion=4,stream-format=adts,rate={sample_rate},channels=2"
        ),
        TrackCodec::Opus { sample_rate, .. } => {
            format!("audio/x-opus,rate={sample_rate},channels=2,channel-mapping-family=0")
        }
        TrackCodec::Flac { sample_rate } => {
            format!("audio/x-flac,framed=true,rate={sample_rate},channels=2")
        }
        TrackCodec::Alac { sample_rate } => {
            format!("audio/x-alac,rate={sample_rate},channels=2")
        }
    }
}
