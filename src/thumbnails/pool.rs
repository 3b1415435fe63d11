//! Bounded worker pool for video frame extraction.
//!
//! - Fixed number of named worker threads (default 2)
//! - FIFO admission through a single flume queue, no priorities
//! - Each task carries its own reply channel; `submit` hands back a future
//! - Started work always runs to completion; queued work is dropped (and
//!   resolves `Cancelled`) when the pool shuts down

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{debug, trace, warn};

use super::generator::PreviewDecoder;
use crate::config::MAX_VIDEO_WORKERS;
use crate::error::{Result, ThumbnailError};
use crate::models::PreviewImage;

/// How long an idle worker blocks before re-checking the shutdown flag.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One frame extraction request.
#[derive(Debug, Clone)]
pub struct FrameTask {
    /// Path to the video.
    pub path: PathBuf,
    /// Target preview width in pixels.
    pub width: u32,
    /// Wait limit for the extraction pipeline.
    pub timeout: Duration,
}

struct Job {
    task: FrameTask,
    reply: Sender<Result<PreviewImage>>,
}

/// Completion of a submitted [`FrameTask`].
///
/// Resolves to `Cancelled` if the pool drops the task before a worker
/// picks it up.
pub struct FrameTicket {
    inner: Pin<Box<dyn Future<Output = Result<PreviewImage>> + Send>>,
}

impl FrameTicket {
    fn new(reply: Receiver<Result<PreviewImage>>) -> Self {
        Self {
            inner: Box::pin(async move {
                reply
                    .recv_async()
                    .await
                    .unwrap_or(Err(ThumbnailError::Cancelled))
            }),
        }
    }
}

impl Future for FrameTicket {
    type Output = Result<PreviewImage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// Fixed-concurrency executor for heavy decode work.
pub struct VideoPool {
    /// Sender for new jobs; `None` once shut down.
    job_tx: Option<Sender<Job>>,
    /// Worker thread handles.
    workers: Vec<JoinHandle<()>>,
    /// Flag to signal workers to stop.
    shutdown: Arc<AtomicBool>,
    /// Number of workers currently running a task.
    active: Arc<AtomicUsize>,
    size: usize,
}

impl VideoPool {
    /// Start a pool with `size` workers (clamped to `1..=MAX_VIDEO_WORKERS`).
    pub fn new(size: usize, decoder: Arc<dyn PreviewDecoder>) -> Result<Self> {
        let size = size.clamp(1, MAX_VIDEO_WORKERS);
        let (job_tx, job_rx) = flume::unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));

        let mut pool = Self {
            job_tx: Some(job_tx),
            workers: Vec::with_capacity(size),
            shutdown,
            active,
            size,
        };

        for worker_id in 0..size {
            let rx = job_rx.clone();
            let shutdown = Arc::clone(&pool.shutdown);
            let active = Arc::clone(&pool.active);
            let decoder = Arc::clone(&decoder);

            let spawned = thread::Builder::new()
                .name(format!("thumb-video-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, shutdown, active, decoder));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(ThumbnailError::WorkerSpawn(e));
                }
            }
        }

        debug!(size, "Started video worker pool");
        Ok(pool)
    }

    /// Queue a task. Never blocks; the returned ticket completes when a
    /// worker has run it.
    pub fn submit(&self, task: FrameTask) -> FrameTicket {
        let (reply_tx, reply_rx) = flume::bounded(1);
        match &self.job_tx {
            Some(job_tx) => {
                trace!(path = ?task.path, "Queued video frame task");
                if job_tx.send(Job { task, reply: reply_tx }).is_err() {
                    warn!("Video pool queue disconnected");
                }
            }
            None => {
                trace!(path = ?task.path, "Video pool is shut down, rejecting task");
            }
        }
        FrameTicket::new(reply_rx)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently running a task.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Tasks waiting for a free worker.
    pub fn queued_count(&self) -> usize {
        self.job_tx.as_ref().map_or(0, |tx| tx.len())
    }

    /// Stop accepting work, let running tasks finish, and join the workers.
    ///
    /// Blocks the calling thread for as long as a running extraction takes,
    /// at most its timeout.
    pub fn shutdown(&mut self) {
        if self.job_tx.is_none() && self.workers.is_empty() {
            return;
        }
        let running = self.active_count();
        if running > 0 {
            debug!(running, "Waiting for running video extractions before shutdown");
        } else {
            debug!("Shutting down video worker pool");
        }

        self.shutdown.store(true, Ordering::SeqCst);
        self.job_tx = None;

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        debug!("Video worker pool shutdown complete");
    }
}

impl Drop for VideoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<Job>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    decoder: Arc<dyn PreviewDecoder>,
) {
    debug!(worker_id, "Video worker started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(WORKER_POLL_INTERVAL) {
            Ok(Job { task, reply }) => {
                active.fetch_add(1, Ordering::Relaxed);
                trace!(worker_id, path = ?task.path, "Extracting video frame");

                let result = decoder.extract_frame(&task.path, task.width, task.timeout);

                active.fetch_sub(1, Ordering::Relaxed);
                // The submitter may have gone away; the work is simply wasted.
                let _ = reply.send(result);
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Video worker stopped");
}
