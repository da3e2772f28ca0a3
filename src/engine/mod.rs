//! Load driver: worker pool, duration timer, and the stop/scale protocol.
mod counters;
mod timer;
mod worker;


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, warn};

use crate::config::{EngineSettings, Options};
use crate::data::{FileSources, Resolver};
use crate::error::{AppResult, EngineError};
use crate::protocol::{ConnectionPool, ProtocolTable, RequesterContext, build_http_client};
use crate::report::{Report, ReportSnapshot, ReportStore, Response};

pub use counters::{Counter, LiveWorkers, RunCounters};

use worker::{RunShared, WorkerExit, run_worker};

/// Passed to [`Engine::close`] to stop every worker.
pub const CLOSE_ALL: u64 = 0;

/// Channels of the run in progress.
struct ActiveRun {
    stop: Arc<Semaphore>,
    results: mpsc::Sender<Response>,
    shared: Arc<RunShared>,
}

struct EngineInner {
    options: Arc<Options>,
    settings: EngineSettings,
    table: ProtocolTable,
    context: RequesterContext,
    report: Arc<Report>,
    store: ReportStore,
    counters: RunCounters,
    live: LiveWorkers,
    run: Mutex<Option<ActiveRun>>,
    serial: tokio::sync::Mutex<()>,
    /// Dispose calls that have not installed their run yet.
    queued: Counter,
    /// Close-all requests aimed at a queued run.
    cancel_pending: Counter,
}

/// Drives one task's load. Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("task_id", &self.inner.options.task_id)
            .field("form", &self.inner.options.form)
            .field("concurrency", &self.concurrency())
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}

struct LiveGuard<'a>(&'a LiveWorkers);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

impl Engine {
    /// Creates an engine with the built-in HTTP and TCP requesters.
    ///
    /// # Errors
    ///
    /// Returns an error when the options or settings are invalid, or the HTTP
    /// client cannot be built.
    pub fn new(options: Options, settings: EngineSettings) -> AppResult<Self> {
        Self::with_protocols(options, settings, ProtocolTable::with_builtins())
    }

    /// Creates an engine that builds requesters from `table`.
    ///
    /// # Errors
    ///
    /// Returns an error when the options or settings are invalid, or the HTTP
    /// client cannot be built.
    pub fn with_protocols(
        options: Options,
        settings: EngineSettings,
        table: ProtocolTable,
    ) -> AppResult<Self> {
        options.validate()?;
        settings.validate()?;
        let http_client =
            build_http_client().map_err(|source| EngineError::BuildClient { source })?;

        let options = Arc::new(options);
        let context = RequesterContext {
            options: Arc::clone(&options),
            resolver: Resolver::new(Arc::new(FileSources::new(settings.data_dir.clone()))),
            timeout: settings.request_timeout(),
            http_client,
            pool: Arc::new(ConnectionPool::new()),
        };
        let report = Arc::new(Report::new(options.task_id.clone(), options.concurrent));

        Ok(Self {
            inner: Arc::new(EngineInner {
                counters: RunCounters::new(options.concurrent, options.duration),
                store: ReportStore::new(settings.store_dir.clone()),
                options,
                settings,
                table,
                context,
                report,
                live: LiveWorkers::default(),
                run: Mutex::new(None),
                serial: tokio::sync::Mutex::new(()),
                queued: Counter::new(0),
                cancel_pending: Counter::new(0),
            }),
        })
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn report(&self) -> &Arc<Report> {
        &self.inner.report
    }

    #[must_use]
    pub fn store(&self) -> &ReportStore {
        &self.inner.store
    }

    /// Target concurrency. Drops as soon as a close is requested, before the
    /// affected workers have exited.
    #[must_use]
    pub fn concurrency(&self) -> u64 {
        self.inner.counters.concurrency.get()
    }

    #[must_use]
    pub fn remaining_duration(&self) -> u64 {
        self.inner.counters.duration.get()
    }

    #[must_use]
    pub fn live_workers(&self) -> u64 {
        self.inner.live.get()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_run().is_some()
    }

    /// Queues a run and returns the future that drives it to completion:
    /// until the duration elapses or every worker is closed or has failed.
    /// Runs of one engine never overlap; a queued run waits for the previous
    /// one to finish. A close-all issued after this call returns applies to
    /// the queued run even if the future has not been polled yet.
    ///
    /// # Errors
    ///
    /// The future fails when no requester can be built for the configured
    /// form, or when workers failed and none ended on a stop signal.
    pub fn dispose(
        &self,
    ) -> impl Future<Output = Result<ReportSnapshot, EngineError>> + Send + 'static {
        self.inner.queued.add(1);
        let ticket = QueuedRun {
            engine: self.clone(),
            installed: false,
        };
        async move { ticket.run().await }
    }

    async fn wait_for_workers(&self) -> Option<ActiveRun> {
        loop {
            self.inner.live.wait_idle().await;
            let mut run = self.lock_run();
            if self.inner.live.get() == 0 {
                return run.take();
            }
        }
    }

    /// Spawns `count` more workers into the current run without raising the
    /// target. Returns how many were spawned; zero when no run is active.
    pub fn start(&self, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot start workers outside a tokio runtime");
            return 0;
        };
        let run = self.lock_run();
        let Some(active) = run.as_ref() else {
            debug!("Start ignored, no run in progress");
            return 0;
        };
        self.spawn_workers(&runtime, active, count);
        count
    }

    /// Must be called with the run lock held so `close` sees the new workers.
    fn spawn_workers(&self, runtime: &Handle, active: &ActiveRun, count: u64) {
        self.inner.live.add(count);
        for _ in 0..count {
            let engine = self.clone();
            let stop = Arc::clone(&active.stop);
            let results = active.results.clone();
            let shared = Arc::clone(&active.shared);
            runtime.spawn(async move {
                let _live = LiveGuard(&engine.inner.live);
                let exit = engine.work(&stop, &results).await;
                drop(results);
                engine.note_exit(&shared, exit);
            });
        }
    }

    async fn work(&self, stop: &Semaphore, results: &mpsc::Sender<Response>) -> WorkerExit {
        let inner = &self.inner;
        let mut requester = match inner.table.build(&inner.context) {
            Ok(requester) => requester,
            Err(error) => return WorkerExit::Failed(error),
        };
        let interval = std::time::Duration::from_millis(inner.options.interval);
        let exit = run_worker(
            requester.as_mut(),
            stop,
            results,
            inner.settings.retries,
            interval,
        )
        .await;
        requester.close();
        exit
    }

    fn note_exit(&self, shared: &RunShared, exit: WorkerExit) {
        match exit {
            WorkerExit::Stopped => shared.note_stopped(),
            WorkerExit::Failed(error) => {
                let _run = self.lock_run();
                let remaining = self.inner.counters.concurrency.sub(1);
                self.inner.report.set_concurrency(remaining);
                warn!("Worker gave up: {}", error);
                shared.note_failure(error);
            }
            WorkerExit::Disconnected => debug!("Worker exited on closed results channel"),
        }
    }

    /// Raises the target concurrency by `count` and spawns that many workers.
    /// Returns how many were spawned; zero when no run is active.
    pub fn add_concurrent_and_start(&self, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Cannot start workers outside a tokio runtime");
            return 0;
        };
        let run = self.lock_run();
        let Some(active) = run.as_ref() else {
            debug!("Scale up ignored, no run in progress");
            return 0;
        };
        let target = self.inner.counters.concurrency.add(count);
        self.inner.report.set_concurrency(target);
        self.spawn_workers(&runtime, active, count);
        count
    }

    /// Asks `count` workers to stop, or all of them for [`CLOSE_ALL`] or a
    /// count at or above the target. The target drops immediately and always
    /// equals the workers not yet signalled, so a close-all sends exactly
    /// that many signals on top of any still pending. A
    /// close-all issued while a run is queued cancels that run; any other
    /// close without an active run is a no-op.
    pub fn close(&self, count: u64) {
        let run = self.lock_run();
        let Some(active) = run.as_ref() else {
            if (count == CLOSE_ALL || count >= self.concurrency()) && self.inner.queued.get() > 0 {
                self.inner.cancel_pending.add(1);
            }
            return;
        };

        let target = self.inner.counters.concurrency.get();
        let signals = if count == CLOSE_ALL || count >= target {
            target
        } else {
            count
        };

        let room = Semaphore::MAX_PERMITS.saturating_sub(active.stop.available_permits());
        let permits = usize::try_from(signals).unwrap_or(usize::MAX).min(room);
        active.stop.add_permits(permits);

        let remaining = self.inner.counters.concurrency.sub(signals);
        self.inner.report.set_concurrency(remaining);
        debug!("Close signal count: {}", permits);
    }
}

/// A queued run. Dropping it before the run is installed releases its slot.
struct QueuedRun {
    engine: Engine,
    installed: bool,
}

impl Drop for QueuedRun {
    fn drop(&mut self) {
        if self.installed {
            return;
        }
        let inner = &self.engine.inner;
        let _run = self.engine.lock_run();
        if inner.queued.sub(1) == 0 {
            inner.cancel_pending.set(0);
        }
    }
}

impl QueuedRun {
    async fn run(mut self) -> Result<ReportSnapshot, EngineError> {
        let engine = self.engine.clone();
        let inner = &engine.inner;
        let _serial = inner.serial.lock().await;

        let mut probe = inner
            .table
            .build(&inner.context)
            .map_err(|source| EngineError::RequesterUnavailable { source })?;
        probe.close();
        drop(probe);

        inner.counters.restore();
        let concurrency = inner.counters.concurrency.get();
        inner.report.reset(inner.options.task_id.clone(), concurrency);

        let (results_tx, results_rx) = mpsc::channel(inner.settings.results_capacity.max(1));
        let report = Arc::clone(&inner.report);
        let store = if inner.options.task_id.is_empty() {
            None
        } else {
            Some(inner.store.clone())
        };
        let consumer =
            tokio::spawn(async move { report.consume(results_rx, store.as_ref()).await });

        let shared = Arc::new(RunShared::default());
        let cancelled = {
            let mut run = engine.lock_run();
            inner.queued.sub(1);
            self.installed = true;
            *run = Some(ActiveRun {
                stop: Arc::new(Semaphore::new(0)),
                results: results_tx,
                shared: Arc::clone(&shared),
            });
            let cancelled = inner.cancel_pending.get() > 0;
            if cancelled {
                inner.cancel_pending.sub(1);
            }
            cancelled
        };

        let timer = if cancelled {
            debug!("Run {} closed before it started", inner.options.task_id);
            shared.note_stopped();
            inner.counters.concurrency.set(0);
            None
        } else {
            debug!(
                "Run {} starting with {} workers for {}s",
                inner.options.task_id,
                concurrency,
                inner.counters.duration.get()
            );
            let timer = engine.spawn_timer(inner.counters.duration.get());
            engine.start(concurrency);
            timer
        };

        let finished = engine.wait_for_workers().await;
        drop(finished);
        if let Some(timer) = timer {
            timer.abort();
        }

        let consumed = consumer.await;
        inner.counters.restore();
        let snapshot = match consumed {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => {
                warn!("Failed to persist report: {}", err);
                inner.report.snapshot()
            }
            Err(source) => return Err(EngineError::Join { source }),
        };

        if let Some(source) = shared.take_fatal() {
            error!("Run {} failed: {}", inner.options.task_id, source);
            return Err(EngineError::AllWorkersFailed { source });
        }
        debug!("Run {} finished", inner.options.task_id);
        Ok(snapshot)
    }
}
