use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::histogram::LatencyHistogram;
use super::store::ReportStore;
use super::types::{ReportSnapshot, Response, TimelineBucket};
use crate::error::ReportError;

/// Running aggregate of one run. Shared by the engine and any number of
/// snapshot readers.
#[derive(Debug)]
pub struct Report {
    state: Mutex<ReportState>,
}

#[derive(Debug)]
struct ReportState {
    totals: ReportSnapshot,
    histogram: Option<LatencyHistogram>,
    timeline: BTreeMap<u64, TimelineBucket>,
    started: Instant,
}

impl ReportState {
    fn fresh(id: String, concurrency: u64) -> Self {
        let histogram = LatencyHistogram::new()
            .inspect_err(|err| warn!("Percentiles disabled: {}", err))
            .ok();
        Self {
            totals: ReportSnapshot {
                id,
                con_currency: concurrency,
                started_at: Some(chrono::Utc::now().to_rfc3339()),
                ..ReportSnapshot::default()
            },
            histogram,
            timeline: BTreeMap::new(),
            started: Instant::now(),
        }
    }
}

impl Report {
    #[must_use]
    pub fn new(id: impl Into<String>, concurrency: u64) -> Self {
        Self {
            state: Mutex::new(ReportState::fresh(id.into(), concurrency)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discards everything recorded so far and starts a new run.
    pub fn reset(&self, id: impl Into<String>, concurrency: u64) {
        *self.lock() = ReportState::fresh(id.into(), concurrency);
    }

    pub fn set_concurrency(&self, concurrency: u64) {
        self.lock().totals.con_currency = concurrency;
    }

    /// Folds one attempt outcome into the aggregate.
    pub fn record(&self, response: &Response) {
        let mut state = self.lock();
        let second = state.started.elapsed().as_secs();
        let totals = &mut state.totals;

        if response.is_success {
            totals.success_num = totals.success_num.saturating_add(1);
            totals.total_time = totals.total_time.saturating_add(response.waste_time);
            totals.max_time = totals.max_time.max(response.waste_time);
            if response.waste_time != 0
                && (totals.min_time == 0 || response.waste_time < totals.min_time)
            {
                totals.min_time = response.waste_time;
            }
            totals.average_time = totals
                .total_time
                .checked_div(totals.success_num)
                .unwrap_or(0);
            totals.elapsed_series.push(response.waste_time);
            if let Some(steps) = response.transaction_waste_time.as_ref() {
                totals.transaction_series.push(steps.clone());
            }
        } else {
            totals.failure_num = totals.failure_num.saturating_add(1);
            let count = totals.err_code.entry(response.err_code).or_insert(0);
            *count = count.saturating_add(1);
            totals
                .err_code_msg
                .entry(response.err_code)
                .or_insert_with(|| response.err_msg.clone());
        }

        if response.is_success
            && let Some(histogram) = state.histogram.as_mut()
        {
            histogram.record(response.waste_time);
        }

        let bucket = state.timeline.entry(second).or_insert(TimelineBucket {
            second,
            ..TimelineBucket::default()
        });
        if response.is_success {
            bucket.success_num = bucket.success_num.saturating_add(1);
            bucket.total_time = bucket.total_time.saturating_add(response.waste_time);
        } else {
            bucket.failure_num = bucket.failure_num.saturating_add(1);
        }
    }

    /// Deep copy of the current aggregate. No record interleaves with it.
    #[must_use]
    pub fn snapshot(&self) -> ReportSnapshot {
        let state = self.lock();
        let mut snapshot = state.totals.clone();
        if let Some(histogram) = state.histogram.as_ref() {
            histogram.fill(&mut snapshot);
        }
        snapshot.timeline = state.timeline.values().cloned().collect();
        snapshot
    }

    /// Drains `results` until every sender is gone, then persists the final
    /// snapshot when a store is given.
    ///
    /// # Errors
    ///
    /// Returns an error when the final snapshot cannot be written.
    pub async fn consume(
        &self,
        mut results: mpsc::Receiver<Response>,
        store: Option<&ReportStore>,
    ) -> Result<ReportSnapshot, ReportError> {
        while let Some(response) = results.recv().await {
            self.record(&response);
        }
        let snapshot = self.snapshot();
        if let Some(store) = store {
            let path = store.persist(&snapshot).await?;
            debug!("Report {} written to {}", snapshot.id, path.display());
        }
        Ok(snapshot)
    }
}
