//! Queue directory watcher
//!
//! A background thread fed by `notify` create/rename events. Each event path goes to
//! the ingestor's per-file handler; the thread also re-sweeps on a fixed interval so
//! files that were not ready get retried without a further notification.

use super::{Ingest, QueueIngestor};
use crate::error::QueueError;
use crate::host::HostOperations;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Interval at which the loop checks the running flag when no events arrive.
const POLL_SLICE: Duration = Duration::from_millis(50);

pub struct QueueWatcher {
    running: Arc<RwLock<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl QueueWatcher {
    /// Start watching the ingestor's queue directory on a new thread.
    pub fn start<H: HostOperations + 'static>(
        ingestor: QueueIngestor<H>,
        rescan_interval: Duration,
    ) -> Result<Self, QueueError> {
        let queue_dir = ingestor.queue_dir().to_path_buf();
        let watch_failed = |message: String| QueueError::WatchFailed {
            path: queue_dir.clone(),
            message,
        };

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                debug!("Watch event dropped after shutdown: {}", e);
            }
        })
        .map_err(|e| watch_failed(format!("failed to create watcher: {}", e)))?;
        watcher
            .watch(&queue_dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_failed(format!("failed to watch directory: {}", e)))?;

        let running = Arc::new(RwLock::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("ferry-queue-watch".to_string())
            .spawn(move || {
                // Owned here so the OS watch lives as long as the loop.
                let _watcher = watcher;
                info!(queue = ?ingestor.queue_dir(), "Watching queue directory");
                run_loop(&ingestor, &rx, &flag, rescan_interval);
                debug!("Queue watcher stopped");
            })?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(&mut self) {
        *self.running.write() = false;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Queue watcher thread panicked");
            }
        }
    }
}

impl Drop for QueueWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<H: HostOperations + 'static>(
    ingestor: &QueueIngestor<H>,
    rx: &mpsc::Receiver<notify::Result<Event>>,
    running: &RwLock<bool>,
    rescan_interval: Duration,
) {
    let mut last_sweep = Instant::now();
    loop {
        if !*running.read() {
            break;
        }

        match rx.recv_timeout(POLL_SLICE) {
            Ok(Ok(event)) => {
                for path in event_paths(event) {
                    match ingestor.handle_file(&path) {
                        Ok(Ingest::Enqueued) => debug!(path = ?path, "Request enqueued from notification"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, path = ?path, "Failed to handle queue notification"),
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Watch error: {}", e);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                error!("Watcher channel disconnected");
                break;
            }
        }

        if last_sweep.elapsed() >= rescan_interval {
            if let Err(e) = ingestor.sweep() {
                warn!(error = %e, "Periodic queue sweep failed");
            }
            last_sweep = Instant::now();
        }
    }
}

/// Paths worth offering: creations, renames into the directory, and writes (a writer
/// that closed its file may have released its lock).
fn event_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event.paths,
        _ => Vec::new(),
    }
}
