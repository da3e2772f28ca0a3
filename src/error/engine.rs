use thiserror::Error;

use super::TransportError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to build HTTP client: {source}")]
    BuildClient {
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to create requester: {source}")]
    RequesterUnavailable {
        #[source]
        source: TransportError,
    },
    #[error("Every worker stopped on errors, last cause: {source}")]
    AllWorkersFailed {
        #[source]
        source: TransportError,
    },
    #[error("Run ended without reporting a result.")]
    Aborted,
    #[error("Engine task join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}
