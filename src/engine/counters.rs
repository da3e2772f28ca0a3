use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Unsigned counter whose read-modify-writes saturate instead of wrapping.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Release);
    }

    /// Returns the value after the addition.
    pub fn add(&self, count: u64) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                Some(value.saturating_add(count))
            })
            .unwrap_or_else(|value| value);
        previous.saturating_add(count)
    }

    /// Returns the value after the subtraction.
    pub fn sub(&self, count: u64) -> u64 {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                Some(value.saturating_sub(count))
            })
            .unwrap_or_else(|value| value);
        previous.saturating_sub(count)
    }
}

/// Target concurrency and remaining seconds of the current run, plus the
/// configured values they are restored to afterwards.
#[derive(Debug)]
pub struct RunCounters {
    pub concurrency: Counter,
    pub duration: Counter,
    configured_concurrency: u64,
    configured_duration: u64,
}

impl RunCounters {
    #[must_use]
    pub const fn new(concurrency: u64, duration: u64) -> Self {
        Self {
            concurrency: Counter::new(concurrency),
            duration: Counter::new(duration),
            configured_concurrency: concurrency,
            configured_duration: duration,
        }
    }

    pub fn restore(&self) {
        self.concurrency.set(self.configured_concurrency);
        self.duration.set(self.configured_duration);
    }

    #[must_use]
    pub const fn configured_concurrency(&self) -> u64 {
        self.configured_concurrency
    }
}

/// Number of worker tasks currently alive. Waiting for zero is how a run
/// knows every worker has exited.
#[derive(Debug)]
pub struct LiveWorkers {
    tx: watch::Sender<u64>,
}

impl Default for LiveWorkers {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }
}

impl LiveWorkers {
    #[must_use]
    pub fn get(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn add(&self, count: u64) {
        self.tx.send_modify(|live| *live = live.saturating_add(count));
    }

    pub fn done(&self) {
        self.tx.send_modify(|live| *live = live.saturating_sub(1));
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        drop(rx.wait_for(|live| *live == 0).await);
    }
}
