use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task has no engine attached.")]
    NoEngine,
    #[error("Task {id} is already running.")]
    AlreadyRunning { id: String },
    #[error("Task {id} is not running.")]
    NotRunning { id: String },
    #[error("Task {id} needs a tokio runtime to run.")]
    NoRuntime { id: String },
    #[error("Scaling a running task needs a concurrency increase or decrease.")]
    ScaleTargetMissing,
}
