//! Concurrent-safe aggregation of attempt outcomes.
mod collector;
mod histogram;
mod store;
mod types;


pub use collector::Report;
pub use histogram::LatencyHistogram;
pub use store::ReportStore;
pub(crate) use types::micros;
pub use types::{ReportSnapshot, Response, TimelineBucket};
