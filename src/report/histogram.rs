use hdrhistogram::{CreationError, Histogram};

use super::types::ReportSnapshot;

/// Slowest success the histogram tells apart: one hour, in microseconds.
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;

/// Success latencies of one run, kept for the percentile columns of the
/// report. Samples above [`MAX_TRACKED_MICROS`] are clamped, not dropped.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    samples: Histogram<u64>,
}

impl LatencyHistogram {
    /// # Errors
    ///
    /// Returns an error if hdrhistogram rejects the bounds.
    pub fn new() -> Result<Self, CreationError> {
        let samples = Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)?;
        Ok(Self { samples })
    }

    pub fn record(&mut self, micros: u64) {
        self.samples.saturating_record(micros);
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.samples.len()
    }

    /// Writes p50/p90/p99 into `snapshot`; all zero before the first sample.
    pub fn fill(&self, snapshot: &mut ReportSnapshot) {
        if self.samples.is_empty() {
            snapshot.p50_time = 0;
            snapshot.p90_time = 0;
            snapshot.p99_time = 0;
            return;
        }
        snapshot.p50_time = self.samples.value_at_quantile(0.5);
        snapshot.p90_time = self.samples.value_at_quantile(0.9);
        snapshot.p99_time = self.samples.value_at_quantile(0.99);
    }
}
