//! Host Runtime
//!
//! The explicit context object tying the pieces together on the affinity thread: it owns
//! the host, the dispatcher's consumer side, the compilation ledger, and the queue
//! watcher. Everything that mutates host state happens inside [`HostRuntime::tick`].

use crate::archive::{Archive, ResponseStore};
use crate::config::{FerryConfig, HostConfig, ResolvedPaths};
use crate::dispatch::{AffinityDispatcher, DispatchHandle, DrainReport};
use crate::error::FerryError;
use crate::executor::BatchExecutor;
use crate::host::HostOperations;
use crate::ledger::{CompilationLedger, FsLockProvider, LedgerTransition, LockProvider};
use crate::queue::{QueueIngestor, QueueWatcher, SweepReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub drained: DrainReport,
    pub transition: LedgerTransition,
}

pub struct HostRuntime<H: HostOperations + 'static> {
    workspace_root: PathBuf,
    paths: ResolvedPaths,
    host_config: HostConfig,
    host: H,
    dispatcher: AffinityDispatcher<H>,
    ingestor: QueueIngestor<H>,
    watcher: Option<QueueWatcher>,
    watch_enabled: bool,
    ledger: CompilationLedger,
    stop_flag: Arc<AtomicBool>,
    started: bool,
}

impl<H: HostOperations + 'static> HostRuntime<H> {
    /// Runtime over real files with `fs2` locks.
    pub fn new(workspace_root: impl Into<PathBuf>, config: &FerryConfig, host: H) -> Self {
        Self::with_lock_provider(workspace_root, config, host, Arc::new(FsLockProvider))
    }

    pub fn with_lock_provider(
        workspace_root: impl Into<PathBuf>,
        config: &FerryConfig,
        host: H,
        provider: Arc<dyn LockProvider>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let paths = config.paths.resolve(&workspace_root);
        let dispatcher = AffinityDispatcher::new();
        let ingestor = QueueIngestor::new(
            paths.queue_dir.clone(),
            dispatcher.handle(),
            Archive::new(paths.archive_dir.clone()),
            ResponseStore::new(paths.responses_dir.clone()),
            BatchExecutor::new(config.host.failure_policy),
        )
        .with_incomplete_grace(config.host.incomplete_grace());
        let ledger = CompilationLedger::new(paths.ledger_file.clone(), provider);
        Self {
            workspace_root,
            paths,
            host_config: config.host.clone(),
            host,
            dispatcher,
            ingestor,
            watcher: None,
            watch_enabled: true,
            ledger,
            stop_flag: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    /// Poll the queue directory on every tick instead of running a watcher thread.
    pub fn without_watcher(mut self) -> Self {
        self.watch_enabled = false;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consume the runtime and hand the host back.
    pub fn into_host(self) -> H {
        self.host
    }

    pub fn ledger(&self) -> &CompilationLedger {
        &self.ledger
    }

    /// Producer handle for other threads that need to run work on the host.
    pub fn dispatch_handle(&self) -> DispatchHandle<H> {
        self.dispatcher.handle()
    }

    /// Set from any thread to make [`HostRuntime::run`] return after the current tick.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    /// Create the well-known directories, recover a stale ledger, sweep, then watch.
    pub fn start(&mut self) -> Result<(), FerryError> {
        if self.started {
            return Ok(());
        }
        for dir in [
            &self.paths.queue_dir,
            &self.paths.archive_dir,
            &self.paths.responses_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        if self.ledger.recover_stale()? {
            info!(ledger = ?self.paths.ledger_file, "Recovered stale compiling record");
        }

        let swept = self.ingestor.sweep()?;
        info!(
            queue = ?self.paths.queue_dir,
            enqueued = swept.enqueued,
            not_ready = swept.not_ready,
            "Host runtime started"
        );

        if self.watch_enabled {
            self.watcher = Some(QueueWatcher::start(
                self.ingestor.clone(),
                self.host_config.rescan_interval(),
            )?);
        }
        self.started = true;
        Ok(())
    }

    /// Re-scan the queue directory now.
    pub fn sweep(&self) -> Result<SweepReport, FerryError> {
        Ok(self.ingestor.sweep()?)
    }

    /// One host tick: drain the dispatcher, then poll the compile flag into the ledger.
    pub fn tick(&mut self) -> TickReport {
        if self.watcher.is_none() {
            if let Err(e) = self.ingestor.sweep() {
                warn!(error = %e, "Queue sweep failed");
            }
        }

        let drained = self.dispatcher.drain(&mut self.host);

        let probe = self.host.compile_probe();
        let host = &self.host;
        let transition = match self.ledger.observe(probe, || host.compile_summary()) {
            Ok(transition) => transition,
            Err(e) => {
                error!(error = %e, "Ledger update failed");
                LedgerTransition::Unchanged
            }
        };

        TickReport {
            drained,
            transition,
        }
    }

    /// Tick on the configured interval until `max_ticks` is reached or the stop flag is
    /// set. Returns the number of ticks run.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<u64, FerryError> {
        self.start()?;
        let interval = self.host_config.tick();
        let mut ticks = 0u64;
        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                debug!(ticks, "Stop requested");
                break;
            }
            if max_ticks.map(|max| ticks >= max).unwrap_or(false) {
                break;
            }
            self.tick();
            ticks += 1;
            std::thread::sleep(interval);
        }
        Ok(ticks)
    }

    /// Close the dispatcher, stop the watcher, run what is already queued, and leave
    /// the ledger idle.
    pub fn stop(&mut self) -> Result<(), FerryError> {
        self.dispatcher.close();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        let drained = self.dispatcher.drain(&mut self.host);
        self.ledger.shutdown()?;
        self.started = false;
        info!(final_drain = drained.executed, "Host runtime stopped");
        Ok(())
    }
}
