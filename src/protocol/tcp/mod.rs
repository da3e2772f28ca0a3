mod pool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec, length_delimited};
use url::Url;

use crate::config::{Form, TcpOptions};
use crate::error::TransportError;

use super::traits::{Target, Transport};

pub use pool::ConnectionPool;

pub type FramedConnection = Framed<TcpStream, LengthDelimitedCodec>;

/// 4-byte big-endian length prefix that counts only the body.
#[must_use]
pub fn frame_codec(max_frame_length: usize) -> length_delimited::Builder {
    let mut builder = LengthDelimitedCodec::builder();
    builder
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(0)
        .big_endian()
        .max_frame_length(max_frame_length);
    builder
}

/// Accepts `host:port` or `tcp://host:port`.
///
/// # Errors
///
/// Returns an error when the URL names no host or port.
pub fn tcp_address(url: &str) -> Result<String, TransportError> {
    let trimmed = url.trim();
    if !trimmed.contains("://") {
        if trimmed.is_empty() || !trimmed.contains(':') {
            return Err(TransportError::InvalidAddress {
                url: url.to_owned(),
            });
        }
        return Ok(trimmed.to_owned());
    }
    let parsed = Url::parse(trimmed).map_err(|_err| TransportError::InvalidAddress {
        url: url.to_owned(),
    })?;
    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => Ok(format!("{}:{}", host, port)),
        _ => Err(TransportError::InvalidAddress {
            url: url.to_owned(),
        }),
    }
}

struct InFlight {
    key: String,
    capacity: usize,
    conn: FramedConnection,
}

pub struct TcpTransport {
    pool: Arc<ConnectionPool>,
    timeout: Duration,
    in_flight: Option<InFlight>,
}

impl TcpTransport {
    #[must_use]
    pub const fn new(pool: Arc<ConnectionPool>, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            in_flight: None,
        }
    }

    fn fail(&self, key: &str, error: TransportError) -> TransportError {
        self.pool.discard(key);
        error
    }

    async fn checkout(
        &self,
        key: &str,
        url: &str,
        options: &TcpOptions,
    ) -> Result<FramedConnection, TransportError> {
        let addr = tcp_address(url)?;
        self.pool.get(key, &addr, options, self.timeout).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn form(&self) -> Form {
        Form::Tcp
    }

    async fn send(
        &mut self,
        target: Target<'_>,
        payload: Option<Bytes>,
    ) -> Result<(), TransportError> {
        self.close();
        let mut conn = self.checkout(target.key, target.url, target.tcp).await?;
        let frame = payload.unwrap_or_default();
        match timeout(self.timeout, conn.send(frame)).await {
            Ok(Ok(())) => {
                self.in_flight = Some(InFlight {
                    key: target.key.to_owned(),
                    capacity: target.tcp.pool_capacity,
                    conn,
                });
                Ok(())
            }
            Ok(Err(err)) => Err(self.fail(target.key, TransportError::from(err))),
            Err(_elapsed) => Err(self.fail(
                target.key,
                TransportError::Timeout {
                    after: self.timeout,
                },
            )),
        }
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let Some(mut flight) = self.in_flight.take() else {
            return Err(TransportError::NothingSent);
        };
        match timeout(self.timeout, flight.conn.next()).await {
            Ok(Some(Ok(frame))) => {
                self.pool.put(&flight.key, flight.conn, flight.capacity);
                Ok(frame.freeze())
            }
            Ok(Some(Err(err))) => Err(self.fail(&flight.key, TransportError::from(err))),
            Ok(None) => Err(self.fail(&flight.key, TransportError::ConnectionClosed)),
            Err(_elapsed) => Err(self.fail(
                &flight.key,
                TransportError::Timeout {
                    after: self.timeout,
                },
            )),
        }
    }

    fn close(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            self.pool.discard(&flight.key);
        }
    }
}
