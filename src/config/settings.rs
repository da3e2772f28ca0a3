use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RESULTS_CAPACITY: usize = 1_000;

/// Process-level engine settings shared by every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Bounds every send and receive of one attempt.
    pub request_timeout_ms: u64,
    /// Retries of a failed attempt before its worker gives up.
    pub retries: u32,
    pub results_capacity: usize,
    /// Directory reports are persisted to.
    pub store_dir: PathBuf,
    /// Base directory for file-backed data fields.
    pub data_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            results_capacity: DEFAULT_RESULTS_CAPACITY,
            store_dir: PathBuf::from("./store"),
            data_dir: PathBuf::from("."),
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Rejects settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error when the timeout or results capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::FieldMustBePositive {
                field: "requestTimeoutMs",
            });
        }
        if self.results_capacity == 0 {
            return Err(ConfigError::FieldMustBePositive {
                field: "resultsCapacity",
            });
        }
        Ok(())
    }
}
