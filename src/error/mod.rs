mod app;
mod config;
mod engine;
mod report;
mod task;
mod transport;
mod validation;

pub use app::{AppError, AppResult};
pub use config::ConfigError;
pub use engine::EngineError;
pub use report::ReportError;
pub use task::TaskError;
pub use transport::{
    CODE_CLOSED, CODE_CONNECT, CODE_IO, CODE_REQUEST, CODE_TIMEOUT, CODE_UNSUPPORTED, ErrorCode,
    TransportError,
};
pub use validation::ValidationError;
