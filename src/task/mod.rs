//! Task lifecycle on top of an [`Engine`], and the registry of running tasks.
mod registry;


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{EngineSettings, Options};
use crate::engine::{CLOSE_ALL, Engine};
use crate::error::{AppResult, EngineError, ReportError, TaskError};
use crate::report::{ReportSnapshot, ReportStore};

pub use registry::TaskRegistry;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp followed by a three-digit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0);
        let sequence = ID_SEQUENCE
            .fetch_add(1, Ordering::Relaxed)
            .checked_rem(1_000)
            .unwrap_or(0);
        Self(format!("{}{:03}", millis, sequence))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Known only by id; no engine attached.
    #[default]
    None,
    Wait,
    Run,
    Over,
    Stop,
    Error,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Wait => "wait",
            Self::Run => "run",
            Self::Over => "over",
            Self::Stop => "stop",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: TaskStatus,
    pub result: Result<ReportSnapshot, EngineError>,
}

/// Resolves once the run started by [`Task::run`] has finished.
#[derive(Debug)]
pub struct RunCompletion {
    rx: oneshot::Receiver<RunOutcome>,
}

impl RunCompletion {
    pub async fn wait(self) -> RunOutcome {
        self.rx.await.unwrap_or_else(|_closed| RunOutcome {
            status: TaskStatus::Error,
            result: Err(EngineError::Aborted),
        })
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    generation: u64,
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    engine: Option<Engine>,
    registry: TaskRegistry,
    store: ReportStore,
    state: Mutex<TaskState>,
}

impl Task {
    /// Validates `options` and builds the task's engine. An empty `taskId`
    /// gets a fresh id.
    ///
    /// # Errors
    ///
    /// Returns an error when the options or settings are invalid.
    pub fn new(
        mut options: Options,
        settings: EngineSettings,
        registry: TaskRegistry,
    ) -> AppResult<Arc<Self>> {
        let id = if options.task_id.trim().is_empty() {
            TaskId::generate()
        } else {
            TaskId::from(options.task_id.clone())
        };
        options.task_id = id.to_string();
        let store = ReportStore::new(settings.store_dir.clone());
        let engine = Engine::new(options, settings)?;
        Ok(Arc::new(Self::assemble(id, Some(engine), store, registry)))
    }

    /// Wraps an engine that was built elsewhere.
    #[must_use]
    pub fn with_engine(engine: Engine, registry: TaskRegistry) -> Arc<Self> {
        let id = if engine.options().task_id.is_empty() {
            TaskId::generate()
        } else {
            TaskId::from(engine.options().task_id.clone())
        };
        let store = engine.store().clone();
        Arc::new(Self::assemble(id, Some(engine), store, registry))
    }

    /// A task known only by id, e.g. one whose report was persisted earlier.
    #[must_use]
    pub fn detached(id: TaskId, store: ReportStore, registry: TaskRegistry) -> Arc<Self> {
        Arc::new(Self::assemble(id, None, store, registry))
    }

    fn assemble(
        id: TaskId,
        engine: Option<Engine>,
        store: ReportStore,
        registry: TaskRegistry,
    ) -> Self {
        let status = if engine.is_some() {
            TaskStatus::Wait
        } else {
            TaskStatus::None
        };
        Self {
            id,
            engine,
            registry,
            store,
            state: Mutex::new(TaskState {
                status,
                generation: 0,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    #[must_use]
    pub const fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.lock_state().status
    }

    /// Starts a run in the background.
    ///
    /// # Errors
    ///
    /// Returns an error when no engine is attached, the id is already
    /// running, or no tokio runtime is available.
    pub fn run(self: &Arc<Self>) -> Result<RunCompletion, TaskError> {
        let engine = self.engine.as_ref().ok_or(TaskError::NoEngine)?;
        let runtime = Handle::try_current().map_err(|_err| TaskError::NoRuntime {
            id: self.id.to_string(),
        })?;

        let generation = {
            let mut state = self.lock_state();
            let generation = state.generation.saturating_add(1);
            self.registry
                .register(self.id.as_str(), generation, Arc::downgrade(self))?;
            state.generation = generation;
            state.status = TaskStatus::Run;
            generation
        };
        info!("Task {} running", self.id);

        let run = engine.dispose();
        let (tx, rx) = oneshot::channel();
        let task = Arc::clone(self);
        runtime.spawn(async move {
            let result = run.await;
            let status = task.finish(generation, result.as_ref().err());
            if tx.send(RunOutcome { status, result }).is_err() {
                debug!("Nobody is waiting on task {}", task.id);
            }
        });
        Ok(RunCompletion { rx })
    }

    fn finish(&self, generation: u64, error: Option<&EngineError>) -> TaskStatus {
        let mut state = self.lock_state();
        if state.generation != generation {
            // A newer run owns the status and the registry entry.
            return if error.is_some() {
                TaskStatus::Error
            } else {
                TaskStatus::Stop
            };
        }
        let status = match error {
            Some(err) => {
                warn!("Task {} failed: {}", self.id, err);
                TaskStatus::Error
            }
            None if state.status == TaskStatus::Stop => TaskStatus::Stop,
            None => TaskStatus::Over,
        };
        state.status = status;
        self.registry.unregister(self.id.as_str(), generation);
        info!("Task {} finished: {}", self.id, status);
        status
    }

    /// Stops `count` workers; [`CLOSE_ALL`] or a count at or above the
    /// current concurrency stops the task and frees its id at once.
    pub fn stop(&self, count: u64) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if count == CLOSE_ALL || count >= engine.concurrency() {
            let mut state = self.lock_state();
            if state.status == TaskStatus::Run {
                state.status = TaskStatus::Stop;
            }
            self.registry.unregister(self.id.as_str(), state.generation);
            info!("Task {} stopping", self.id);
        }
        engine.close(count);
    }

    /// Adds `count` workers to the running engine. Returns how many started.
    pub fn add_concurrent_and_start(&self, count: u64) -> u64 {
        self.engine
            .as_ref()
            .map_or(0, |engine| engine.add_concurrent_and_start(count))
    }

    /// Changes the concurrency of a running task: `lessen` stops workers,
    /// otherwise `add` starts more.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` unless this task is registered as running, and
    /// `ScaleTargetMissing` when both counts are zero.
    pub fn scale(&self, lessen: u64, add: u64) -> Result<(), TaskError> {
        let registered = self
            .registry
            .lookup(self.id.as_str())
            .is_some_and(|running| std::ptr::eq(Arc::as_ptr(&running), self));
        if !registered {
            return Err(TaskError::NotRunning {
                id: self.id.to_string(),
            });
        }
        if lessen > 0 {
            self.stop(lessen);
        } else if add > 0 {
            self.add_concurrent_and_start(add);
        } else {
            return Err(TaskError::ScaleTargetMissing);
        }
        Ok(())
    }

    /// Live report of the attached engine; empty for a detached task.
    #[must_use]
    pub fn info(&self) -> ReportSnapshot {
        self.engine
            .as_ref()
            .map(|engine| engine.report().snapshot())
            .unwrap_or_default()
    }

    /// The report persisted by the last finished run.
    ///
    /// # Errors
    ///
    /// Returns an error when no report was written for this id.
    pub async fn persisted_info(&self) -> Result<ReportSnapshot, ReportError> {
        self.store.load(self.id.as_str()).await
    }
}
