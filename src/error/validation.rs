use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing options file (set --options or LOADRIG_OPTIONS).")]
    MissingOptionsFile,
    #[error("Expected a positive integer, got '{value}'.")]
    InvalidPositive { value: String },
    #[error("URL must not be empty.")]
    MissingUrl,
    #[error("Concurrency must be > 0.")]
    ConcurrencyZero,
    #[error("Unknown request form {value}. Use 0 (http), 1 (tcp) or 2 (websocket).")]
    UnknownForm { value: u8 },
    #[error("Transaction step {index} must have a name.")]
    StepMissingName { index: usize },
    #[error("Transaction step name '{name}' is used more than once.")]
    DuplicateStepName { name: String },
    #[error("Transaction step '{name}' must have a URL.")]
    StepMissingUrl { name: String },
}
