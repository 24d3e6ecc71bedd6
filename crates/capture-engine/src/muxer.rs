//! Container multiplexing.
//!
//! The output file is a single mutable resource, so exactly one writer
//! thread owns the container sink. Encoders feed it through a bounded
//! channel; chunks may arrive out of real-time order across tracks, but
//! each track's own timestamp sequence is enforced at write time.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use reelcap_common::error::{RecorderError, RecorderResult};
use serde::Serialize;

use crate::track::{EncodedChunk, TrackKind, TrackSpec};

/// The actual container writer. Production wraps a GStreamer mux
/// pipeline; tests substitute an in-memory recorder.
pub trait ContainerSink: Send {
    /// Append one encoded chunk to the container.
    fn write(&mut self, chunk: EncodedChunk) -> RecorderResult<()>;

    /// Flush and finalize the container so the file is independently
    /// playable.
    fn finalize(&mut self) -> RecorderResult<()>;
}

/// Per-track totals reported at finalization.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub kind: TrackKind,
    pub chunks: u64,
    pub bytes: u64,

    /// Units lost before the container: queue backpressure drops plus
    /// ordering rejections. Filled in by the session from the encoder
    /// reports.
    pub dropped_units: u64,
}

/// What `finish()` reports about the written file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,

    /// True when the drain timed out and chunks were abandoned: the file
    /// is playable but missing its tail, and must never be presented as
    /// equivalent to a fully finalized recording.
    pub partially_complete: bool,

    /// Chunks abandoned by a timed-out drain.
    pub abandoned_chunks: u64,

    pub tracks: Vec<TrackSummary>,
}

impl FileSummary {
    pub fn track_mut(&mut self, kind: TrackKind) -> Option<&mut TrackSummary> {
        self.tracks.iter_mut().find(|t| t.kind == kind)
    }
}

struct MuxOutcome {
    summary: FileSummary,
    error: Option<RecorderError>,
}

struct MuxShared {
    /// Set by `finish()`: drain until this instant, then abandon.
    drain_deadline: Mutex<Option<Instant>>,
}

/// Owns the output container through a single writer thread.
///
/// `finish()` is idempotent-once: a second call is a programming error
/// and is rejected without touching the already-written file.
pub struct Multiplexer {
    path: PathBuf,
    tx: Option<SyncSender<EncodedChunk>>,
    worker: Option<JoinHandle<MuxOutcome>>,
    shared: Arc<MuxShared>,
    finished: bool,
}

/// Chunks buffered between encoders and the writer thread.
const MUX_CHANNEL_CAPACITY: usize = 256;

/// How often the writer re-checks the drain deadline while idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

impl Multiplexer {
    /// Open the output container and start the writer thread.
    pub fn open(
        path: &Path,
        specs: &[TrackSpec],
        sink: Box<dyn ContainerSink>,
    ) -> RecorderResult<Self> {
        let (tx, rx) = mpsc::sync_channel(MUX_CHANNEL_CAPACITY);
        let shared = Arc::new(MuxShared {
            drain_deadline: Mutex::new(None),
        });

        let summary = FileSummary {
            path: path.to_path_buf(),
            partially_complete: false,
            abandoned_chunks: 0,
            tracks: specs
                .iter()
                .map(|spec| TrackSummary {
                    kind: spec.kind,
                    chunks: 0,
                    bytes: 0,
                    dropped_units: 0,
                })
                .collect(),
        };

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("mux-writer".to_string())
            .spawn(move || run_writer(rx, sink, summary, worker_shared))
            .map_err(|e| RecorderError::write(format!("writer thread spawn failed: {e}")))?;

        tracing::debug!(path = %path.display(), tracks = specs.len(), "Multiplexer opened");

        Ok(Self {
            path: path.to_path_buf(),
            tx: Some(tx),
            worker: Some(worker),
            shared,
            finished: false,
        })
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A channel sender for one encoder. Senders must be dropped before
    /// `finish()` can complete its drain.
    pub fn sender(&self) -> RecorderResult<SyncSender<EncodedChunk>> {
        self.tx.clone().ok_or(RecorderError::AlreadyFinalized)
    }

    /// Drain pending chunks (bounded by `timeout`), finalize the
    /// container, and report the file summary.
    pub fn finish(&mut self, timeout: Duration) -> RecorderResult<FileSummary> {
        if self.finished {
            return Err(RecorderError::AlreadyFinalized);
        }
        self.finished = true;

        *self
            .shared
            .drain_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now() + timeout);
        self.tx.take();

        let outcome = match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RecorderError::write("writer thread panicked"))?,
            None => return Err(RecorderError::AlreadyFinalized),
        };

        match outcome.error {
            Some(e) => Err(e),
            None => {
                tracing::info!(
                    path = %outcome.summary.path.display(),
                    partially_complete = outcome.summary.partially_complete,
                    "Container finalized"
                );
                Ok(outcome.summary)
            }
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Abandon immediately; an unfinished multiplexer is a
            // session-failure path, not a normal stop.
            *self
                .shared
                .drain_deadline
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
            self.tx.take();
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_writer(
    rx: mpsc::Receiver<EncodedChunk>,
    mut sink: Box<dyn ContainerSink>,
    mut summary: FileSummary,
    shared: Arc<MuxShared>,
) -> MuxOutcome {
    let mut last_pts: std::collections::HashMap<TrackKind, u64> = std::collections::HashMap::new();
    let mut write_error: Option<RecorderError> = None;

    loop {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(chunk) => {
                if deadline_passed(&shared) {
                    // Drain timed out with chunks still pending.
                    summary.partially_complete = true;
                    summary.abandoned_chunks += 1 + discard_pending(&rx);
                    break;
                }
                if write_error.is_some() {
                    // Keep consuming so encoders don't block on a dead
                    // writer; the chunks go nowhere.
                    continue;
                }

                // Per-track monotonic timestamps at write time.
                if let Some(&last) = last_pts.get(&chunk.track) {
                    if chunk.pts_ns <= last {
                        tracing::warn!(
                            track = %chunk.track,
                            pts_ns = chunk.pts_ns,
                            "Out-of-order chunk dropped at writer"
                        );
                        continue;
                    }
                }
                last_pts.insert(chunk.track, chunk.pts_ns);

                let bytes = chunk.payload.len() as u64;
                let kind = chunk.track;
                match sink.write(chunk) {
                    Ok(()) => {
                        if let Some(track) = summary.track_mut(kind) {
                            track.chunks += 1;
                            track.bytes += bytes;
                        }
                    }
                    Err(e) => {
                        tracing::error!(track = %kind, error = %e, "Container write failed");
                        write_error = Some(e);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline_passed(&shared) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let error = match write_error {
        Some(e) => Some(e),
        None => sink.finalize().err().map(|e| match e {
            RecorderError::Write { .. } => e,
            other => RecorderError::write(other.to_string()),
        }),
    };

    MuxOutcome { summary, error }
}

fn deadline_passed(shared: &MuxShared) -> bool {
    shared
        .drain_deadline
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some_and(|deadline| Instant::now() >= deadline)
}

fn discard_pending(rx: &mpsc::Receiver<EncodedChunk>) -> u64 {
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}
