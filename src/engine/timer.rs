use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::debug;

use super::{CLOSE_ALL, Engine};

impl Engine {
    /// Counts the run down once per second and closes every worker at zero.
    /// A zero duration means the run only ends on an explicit close.
    pub(super) fn spawn_timer(&self, seconds: u64) -> Option<JoinHandle<()>> {
        if seconds == 0 {
            return None;
        }
        let engine = self.clone();
        let period = Duration::from_secs(1);
        Some(tokio::spawn(async move {
            let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut ticks = interval_at(first, period);
            loop {
                ticks.tick().await;
                let remaining = engine.inner.counters.duration.sub(1);
                if remaining == 0 {
                    debug!("Duration elapsed, closing all workers");
                    engine.close(CLOSE_ALL);
                    break;
                }
            }
        }))
    }
}
