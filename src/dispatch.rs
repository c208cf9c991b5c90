//! Affinity Dispatcher
//!
//! Multi-producer, single-consumer hand-off onto the host's affinity thread. Any thread
//! holding a [`DispatchHandle`] may enqueue work; the single [`AffinityDispatcher`] drains
//! everything queued at the start of a pass, in enqueue order, once per host tick.
//! Only the queue container is shared; host state is reached exclusively through the
//! `&mut H` handed to each work item during a drain.

use crate::error::DispatchError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A unit of work executed against the host on the affinity thread.
pub type WorkItem<H> = Box<dyn FnOnce(&mut H) -> Result<(), DispatchError> + Send + 'static>;

struct Queued<H> {
    seq: u64,
    label: String,
    item: WorkItem<H>,
}

struct Shared<H> {
    queue: Mutex<VecDeque<Queued<H>>>,
    closed: AtomicBool,
    next_seq: AtomicU64,
}

/// Cloneable producer side.
pub struct DispatchHandle<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for DispatchHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: 'static> DispatchHandle<H> {
    /// Enqueue a work item. Never blocks; fails only once the dispatcher is closed.
    pub fn enqueue<F>(&self, label: impl Into<String>, item: F) -> Result<u64, DispatchError>
    where
        F: FnOnce(&mut H) -> Result<(), DispatchError> + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        debug!(seq, label = %label, "Work item enqueued");
        self.shared.queue.lock().push_back(Queued {
            seq,
            label,
            item: Box::new(item),
        });
        Ok(seq)
    }

    /// Number of items waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

/// Single consumer side. Not cloneable: exactly one drain loop exists.
pub struct AffinityDispatcher<H> {
    shared: Arc<Shared<H>>,
}

impl<H: 'static> Default for AffinityDispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: 'static> AffinityDispatcher<H> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    pub fn handle(&self) -> DispatchHandle<H> {
        DispatchHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Execute every item queued at the start of this pass, in enqueue order.
    ///
    /// Items enqueued while the pass runs wait for the next pass. A failing or
    /// panicking item is logged and does not stop the remaining items.
    pub fn drain(&self, host: &mut H) -> DrainReport {
        let batch: VecDeque<Queued<H>> = std::mem::take(&mut *self.shared.queue.lock());
        let mut report = DrainReport::default();

        for queued in batch {
            let Queued { seq, label, item } = queued;
            report.executed += 1;
            match run_item(item, host) {
                Ok(()) => {}
                Err(e @ DispatchError::ItemPanicked(_)) => {
                    report.failed += 1;
                    error!(seq, label = %label, error = %e, "Work item panicked");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(seq, label = %label, error = %e, "Work item failed");
                }
            }
        }

        if report.executed > 0 {
            debug!(
                executed = report.executed,
                failed = report.failed,
                "Drain pass complete"
            );
        }
        report
    }

    /// Reject further enqueues. Items already queued can still be drained.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

/// Run one item, turning a panic into [`DispatchError::ItemPanicked`].
fn run_item<H>(item: WorkItem<H>, host: &mut H) -> Result<(), DispatchError> {
    match catch_unwind(AssertUnwindSafe(|| item(host))) {
        Ok(result) => result,
        Err(panic) => Err(DispatchError::ItemPanicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
