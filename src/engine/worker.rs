use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError, mpsc};
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::Requester;
use crate::report::Response;

/// Why a worker loop ended.
#[derive(Debug)]
pub(super) enum WorkerExit {
    Stopped,
    Failed(TransportError),
    Disconnected,
}

/// Exit bookkeeping shared by the workers of one run.
#[derive(Debug, Default)]
pub(super) struct RunShared {
    stopped: AtomicBool,
    last_error: Mutex<Option<TransportError>>,
}

impl RunShared {
    pub(super) fn note_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(super) fn note_failure(&self, error: TransportError) {
        let mut slot = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(error);
    }

    /// The run-fatal error: some worker failed and none ended on a stop signal.
    pub(super) fn take_fatal(&self) -> Option<TransportError> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn stop_requested(stop: &Semaphore) -> bool {
    match stop.try_acquire() {
        Ok(permit) => {
            permit.forget();
            true
        }
        Err(TryAcquireError::Closed) => true,
        Err(TryAcquireError::NoPermits) => false,
    }
}

/// Issues attempts until a stop signal arrives or an attempt keeps failing
/// past the retry budget. Failed attempts that are retried are not reported.
pub(super) async fn run_worker(
    requester: &mut dyn Requester,
    stop: &Semaphore,
    results: &mpsc::Sender<Response>,
    retries: u32,
    interval: Duration,
) -> WorkerExit {
    let mut failures = 0_u32;
    loop {
        if stop_requested(stop) {
            return WorkerExit::Stopped;
        }

        match requester.dispose().await {
            Ok(response) => {
                failures = 0;
                if results.send(response).await.is_err() {
                    return WorkerExit::Disconnected;
                }
            }
            Err(failure) => {
                if failures >= retries {
                    if results.send(failure.response).await.is_err() {
                        debug!("Results channel closed before a final failure was reported");
                    }
                    return WorkerExit::Failed(failure.error);
                }
                failures = failures.saturating_add(1);
                debug!("Attempt failed, retry {}/{}: {}", failures, retries, failure.error);
            }
        }

        if !interval.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                permit = stop.acquire() => {
                    if let Ok(permit) = permit {
                        permit.forget();
                    }
                    return WorkerExit::Stopped;
                }
            }
        }
    }
}
