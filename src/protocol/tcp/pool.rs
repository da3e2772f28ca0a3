use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;

use crate::config::TcpOptions;
use crate::error::TransportError;

use super::{FramedConnection, frame_codec};

#[derive(Debug, Default)]
struct Slot {
    idle: Vec<FramedConnection>,
    open: usize,
}

/// Idle framed connections keyed by endpoint or step name.
///
/// At most `poolCapacity` connections per key are handed out before callers
/// start waiting; after `poolWaitMs` a waiter dials past the limit. Only
/// connections that completed an exchange come back through [`Self::put`].
#[derive(Debug, Default)]
pub struct ConnectionPool {
    slots: Mutex<HashMap<String, Slot>>,
    returned: Notify,
}

enum Checkout {
    Idle(FramedConnection),
    Dial,
    Wait,
}

impl ConnectionPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self, key: &str, capacity: usize, force: bool) -> Checkout {
        let mut slots = self.lock();
        let slot = slots.entry(key.to_owned()).or_default();
        if let Some(conn) = slot.idle.pop() {
            return Checkout::Idle(conn);
        }
        if force || slot.open < capacity {
            slot.open = slot.open.saturating_add(1);
            return Checkout::Dial;
        }
        Checkout::Wait
    }

    /// Takes an idle connection for `key` or dials `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error when dialing fails or exceeds `connect_timeout`.
    pub async fn get(
        &self,
        key: &str,
        addr: &str,
        options: &TcpOptions,
        connect_timeout: Duration,
    ) -> Result<FramedConnection, TransportError> {
        let capacity = options.pool_capacity.max(1);
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(options.pool_wait_ms))
            .unwrap_or_else(Instant::now);
        let mut force = false;

        loop {
            match self.checkout(key, capacity, force) {
                Checkout::Idle(conn) => return Ok(conn),
                Checkout::Dial => break,
                Checkout::Wait => {
                    if timeout_at(deadline, self.returned.notified()).await.is_err() {
                        debug!("Pool for '{}' exhausted, dialing past capacity", key);
                        force = true;
                    }
                }
            }
        }

        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY on {}: {}", addr, err);
                }
                Ok(frame_codec(options.max_frame_length).new_framed(stream))
            }
            Ok(Err(source)) => {
                self.discard(key);
                Err(TransportError::Connect {
                    addr: addr.to_owned(),
                    source,
                })
            }
            Err(_elapsed) => {
                self.discard(key);
                Err(TransportError::Timeout {
                    after: connect_timeout,
                })
            }
        }
    }

    /// Returns a connection after a successful exchange.
    pub fn put(&self, key: &str, conn: FramedConnection, capacity: usize) {
        {
            let mut slots = self.lock();
            let slot = slots.entry(key.to_owned()).or_default();
            if slot.idle.len() < capacity.max(1) {
                slot.idle.push(conn);
            } else {
                slot.open = slot.open.saturating_sub(1);
            }
        }
        self.returned.notify_one();
    }

    /// Forgets a connection that failed; the caller drops it.
    pub fn discard(&self, key: &str) {
        {
            let mut slots = self.lock();
            if let Some(slot) = slots.get_mut(key) {
                slot.open = slot.open.saturating_sub(1);
            }
        }
        self.returned.notify_one();
    }

    #[must_use]
    pub fn idle_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, |slot| slot.idle.len())
    }

    #[must_use]
    pub fn open_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, |slot| slot.open)
    }
}
