//! Per-track encoding with bounded buffering.
//!
//! Each track encoder owns a bounded queue and a dedicated worker
//! thread, so a slow encoder on one track never stalls its siblings or
//! the capture callbacks. When the queue is full the oldest unit is
//! dropped and counted; the queue never grows past its bound and a push
//! never blocks beyond brief lock contention.

use std::collections::VecDeque;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use reelcap_common::error::{RecorderError, RecorderResult};

use crate::track::{EncodedChunk, RawUnit, TrackEvent, TrackKind};

/// Compression backend for one track. Implementations wrap the actual
/// codec; the queueing and ordering rules live in [`TrackEncoder`].
pub trait EncodeBackend: Send {
    /// Compress one raw unit. May return zero or more chunks (codecs
    /// buffer internally).
    fn encode(&mut self, unit: RawUnit) -> RecorderResult<Vec<EncodedChunk>>;

    /// Flush everything still buffered inside the codec.
    fn finish(&mut self) -> RecorderResult<Vec<EncodedChunk>>;
}

/// Tuning for a track encoder.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Maximum raw units buffered between capture and compression.
    pub queue_capacity: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
        }
    }
}

/// Outcome of a drained track encoder, reported at session end.
#[derive(Debug, Clone)]
pub struct EncoderReport {
    pub kind: TrackKind,

    /// Units that reached the backend.
    pub encoded_units: u64,

    /// Units dropped at the bounded queue (backpressure).
    pub dropped_units: u64,

    /// Units rejected for violating strict timestamp ordering.
    pub rejected_units: u64,

    /// Terminal backend error, if the track failed.
    pub error: Option<String>,
}

struct QueueInner {
    buf: VecDeque<RawUnit>,
    dropped: u64,
    closed: bool,
}

/// Bounded drop-oldest queue between capture callbacks and the worker.
struct EncodeQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    capacity: usize,
}

impl EncodeQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                buf: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a unit, dropping the oldest queued unit when full.
    /// Returns the number of units dropped by this push (0 or 1).
    fn push(&self, unit: RawUnit) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return 0;
        }
        let mut dropped_now = 0;
        if inner.buf.len() >= self.capacity {
            inner.buf.pop_front();
            inner.dropped += 1;
            dropped_now = 1;
        }
        inner.buf.push_back(unit);
        self.ready.notify_one();
        dropped_now
    }

    /// Dequeue the next unit, blocking until one arrives or the queue is
    /// closed and empty.
    fn pop(&self) -> Option<RawUnit> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(unit) = inner.buf.pop_front() {
                return Some(unit);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        self.ready.notify_all();
    }

    fn dropped(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buf
            .len()
    }
}

/// Push handle for capture callbacks. Cheap to clone, safe to call from
/// any thread.
#[derive(Clone)]
pub struct EncoderSink {
    kind: TrackKind,
    queue: Arc<EncodeQueue>,
}

impl EncoderSink {
    /// Enqueue a raw unit for compression. Never blocks beyond brief
    /// lock contention; overflow drops the oldest queued unit.
    pub fn push(&self, unit: RawUnit) {
        if self.queue.push(unit) > 0 {
            tracing::trace!(track = %self.kind, "Encoder queue full; dropped oldest unit");
        }
    }
}

struct WorkerOutcome {
    encoded: u64,
    rejected: u64,
    error: Option<String>,
}

/// Encoder for one track: bounded queue in front, worker thread behind,
/// encoded chunks flowing into the multiplexer channel.
pub struct TrackEncoder {
    kind: TrackKind,
    queue: Arc<EncodeQueue>,
    worker: Option<JoinHandle<WorkerOutcome>>,
}

impl TrackEncoder {
    /// Spawn the worker. Chunks go to `chunk_tx`; terminal failures are
    /// reported on `events` so the session can contain them.
    pub fn spawn(
        kind: TrackKind,
        mut backend: Box<dyn EncodeBackend>,
        settings: EncoderSettings,
        chunk_tx: SyncSender<EncodedChunk>,
        events: std::sync::mpsc::Sender<TrackEvent>,
    ) -> RecorderResult<Self> {
        let queue = Arc::new(EncodeQueue::new(settings.queue_capacity.max(1)));
        let worker_queue = Arc::clone(&queue);

        let worker = std::thread::Builder::new()
            .name(format!("encode-{kind}"))
            .spawn(move || {
                let outcome = run_worker(kind, worker_queue, backend.as_mut(), &chunk_tx);
                if let Some(ref message) = outcome.error {
                    events
                        .send(TrackEvent::EncoderFailed {
                            track: kind,
                            message: message.clone(),
                        })
                        .ok();
                }
                outcome
            })
            .map_err(|e| {
                RecorderError::encoder_init(kind.as_str(), format!("worker spawn failed: {e}"))
            })?;

        Ok(Self {
            kind,
            queue,
            worker: Some(worker),
        })
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Push handle for capture callbacks.
    pub fn sink(&self) -> EncoderSink {
        EncoderSink {
            kind: self.kind,
            queue: Arc::clone(&self.queue),
        }
    }

    /// Close the queue, flush the backend, and join the worker.
    ///
    /// Everything still queued is compressed before the backend is
    /// flushed, so the tail of a recording is not lost.
    pub fn drain(mut self) -> EncoderReport {
        self.queue.close();
        let outcome = match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => WorkerOutcome {
                    encoded: 0,
                    rejected: 0,
                    error: Some("encoder worker panicked".to_string()),
                },
            },
            None => WorkerOutcome {
                encoded: 0,
                rejected: 0,
                error: None,
            },
        };

        EncoderReport {
            kind: self.kind,
            encoded_units: outcome.encoded,
            dropped_units: self.queue.dropped(),
            rejected_units: outcome.rejected,
            error: outcome.error,
        }
    }
}

impl Drop for TrackEncoder {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    kind: TrackKind,
    queue: Arc<EncodeQueue>,
    backend: &mut dyn EncodeBackend,
    chunk_tx: &SyncSender<EncodedChunk>,
) -> WorkerOutcome {
    let mut encoded = 0u64;
    let mut rejected = 0u64;
    let mut last_pts: Option<u64> = None;
    let mut os_dropped = 0u64;

    while let Some(unit) = queue.pop() {
        os_dropped += u64::from(unit.dropped_before);

        // Strictly increasing pts per track; anything else is rejected
        // and counted rather than silently reordered.
        if let Some(last) = last_pts {
            if unit.pts_ns <= last {
                rejected += 1;
                tracing::warn!(
                    track = %kind,
                    pts_ns = unit.pts_ns,
                    last_pts_ns = last,
                    "Non-monotonic unit rejected"
                );
                continue;
            }
        }
        last_pts = Some(unit.pts_ns);

        match backend.encode(unit) {
            Ok(chunks) => {
                encoded += 1;
                for chunk in chunks {
                    if chunk_tx.send(chunk).is_err() {
                        tracing::warn!(track = %kind, "Multiplexer gone; encoder stopping");
                        return WorkerOutcome {
                            encoded,
                            rejected,
                            error: Some("multiplexer channel closed".to_string()),
                        };
                    }
                }
            }
            Err(e) => {
                tracing::error!(track = %kind, error = %e, "Encoder backend failed");
                return WorkerOutcome {
                    encoded,
                    rejected,
                    error: Some(e.to_string()),
                };
            }
        }
    }

    // Queue closed: flush whatever the codec still buffers.
    match backend.finish() {
        Ok(chunks) => {
            for chunk in chunks {
                if chunk_tx.send(chunk).is_err() {
                    return WorkerOutcome {
                        encoded,
                        rejected,
                        error: Some("multiplexer channel closed".to_string()),
                    };
                }
            }
        }
        Err(e) => {
            return WorkerOutcome {
                encoded,
                rejected,
                error: Some(e.to_string()),
            };
        }
    }

    if os_dropped > 0 {
        tracing::info!(track = %kind, os_dropped, "OS-reported drops during capture");
    }

    WorkerOutcome {
        encoded,
        rejected,
        error: None,
    }
}
