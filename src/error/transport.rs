use std::time::Duration;

use thiserror::Error;

use crate::config::Form;

/// Numeric error code carried by a failed [`crate::report::Response`].
///
/// HTTP failures use the response status; everything else maps to one of the
/// synthetic codes below.
pub type ErrorCode = i32;

pub const CODE_CONNECT: ErrorCode = 1;
pub const CODE_TIMEOUT: ErrorCode = 2;
pub const CODE_IO: ErrorCode = 3;
pub const CODE_CLOSED: ErrorCode = 4;
pub const CODE_REQUEST: ErrorCode = 5;
pub const CODE_UNSUPPORTED: ErrorCode = 6;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unexpected status code {status}.")]
    Status { status: u16 },
    #[error("HTTP request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid HTTP method '{method}'.")]
    InvalidMethod { method: String },
    #[error("Invalid header '{name}'.")]
    InvalidHeader { name: String },
    #[error("Invalid TCP address '{url}'.")]
    InvalidAddress { url: String },
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out after {}ms.", after.as_millis())]
    Timeout { after: Duration },
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("Connection closed before a response frame arrived.")]
    ConnectionClosed,
    #[error("Receive called without a pending send.")]
    NothingSent,
    #[error("Failed to encode payload: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("No requester registered for form {form}.")]
    UnsupportedProtocol { form: Form },
    #[error("{step}, cause: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<TransportError>,
    },
}

impl TransportError {
    pub fn step(step: &str, source: Self) -> Self {
        Self::Step {
            step: step.to_owned(),
            source: Box::new(source),
        }
    }

    pub fn from_reqwest(source: reqwest::Error, timeout: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout { after: timeout }
        } else {
            Self::Http { source }
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status { status } => ErrorCode::from(*status),
            Self::Http { source } => {
                if source.is_connect() {
                    CODE_CONNECT
                } else if source.is_builder() || source.is_request() {
                    CODE_REQUEST
                } else {
                    CODE_IO
                }
            }
            Self::InvalidMethod { .. }
            | Self::InvalidHeader { .. }
            | Self::InvalidAddress { .. }
            | Self::Encode { .. } => CODE_REQUEST,
            Self::Connect { .. } => CODE_CONNECT,
            Self::Timeout { .. } => CODE_TIMEOUT,
            Self::Io { .. } => CODE_IO,
            Self::ConnectionClosed | Self::NothingSent => CODE_CLOSED,
            Self::UnsupportedProtocol { .. } => CODE_UNSUPPORTED,
            Self::Step { source, .. } => source.code(),
        }
    }
}
