use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{Form, HttpOptions, TcpOptions};
use crate::error::TransportError;
use crate::report::Response;

/// One full attempt failed. `response` is what the report records if the
/// failure is final.
#[derive(Debug)]
pub struct AttemptFailure {
    pub response: Response,
    pub error: TransportError,
}

impl AttemptFailure {
    #[must_use]
    pub fn new(elapsed: Duration, error: TransportError) -> Self {
        Self {
            response: Response::failure(elapsed, &error),
            error,
        }
    }
}

/// Uniform per-protocol attempt contract used by engine workers.
#[async_trait]
pub trait Requester: Send {
    fn form(&self) -> Form;

    /// Runs one attempt: a single send/recv, or every transaction step in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the failed attempt's response together with its cause.
    async fn dispose(&mut self) -> Result<Response, AttemptFailure>;

    /// Resolves the payload for the current target and sends it.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be built or delivered.
    async fn send(&mut self) -> Result<(), TransportError>;

    /// Waits for the reply to the last send.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, or a failure status.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    /// Drops state held directly by the requester.
    fn close(&mut self);
}

/// Where a single exchange goes.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Pool key: the URL in single mode, the step name in transaction mode.
    pub key: &'a str,
    pub url: &'a str,
    pub http: &'a HttpOptions,
    pub tcp: &'a TcpOptions,
}

/// Wire-level exchange for one protocol.
#[async_trait]
pub trait Transport: Send {
    fn form(&self) -> Form;

    /// # Errors
    ///
    /// Returns an error when the payload cannot be delivered.
    async fn send(
        &mut self,
        target: Target<'_>,
        payload: Option<Bytes>,
    ) -> Result<(), TransportError>;

    /// # Errors
    ///
    /// Returns an error when no valid reply arrives.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    fn close(&mut self);
}
