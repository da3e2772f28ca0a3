use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, TransportError};

/// Outcome of one attempt. Times are microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub waste_time: u64,
    pub is_success: bool,
    pub err_code: ErrorCode,
    pub err_msg: String,
    #[serde(skip)]
    pub data: Bytes,
    /// Per-step elapsed time, present in transaction mode.
    pub transaction_waste_time: Option<BTreeMap<String, u64>>,
}

impl Response {
    #[must_use]
    pub fn success(elapsed: Duration, data: Bytes) -> Self {
        Self {
            waste_time: micros(elapsed),
            is_success: true,
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(elapsed: Duration, error: &TransportError) -> Self {
        Self {
            waste_time: micros(elapsed),
            is_success: false,
            err_code: error.code(),
            err_msg: error.to_string(),
            ..Self::default()
        }
    }
}

pub(crate) fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Outcomes that landed in one second of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    pub second: u64,
    pub success_num: u64,
    pub failure_num: u64,
    pub total_time: u64,
}

/// Point-in-time copy of a [`crate::report::Report`]. Times are microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportSnapshot {
    pub id: String,
    pub con_currency: u64,
    pub started_at: Option<String>,
    pub total_time: u64,
    pub max_time: u64,
    pub min_time: u64,
    pub average_time: u64,
    pub success_num: u64,
    pub failure_num: u64,
    pub err_code: BTreeMap<ErrorCode, u64>,
    pub err_code_msg: BTreeMap<ErrorCode, String>,
    pub p50_time: u64,
    pub p90_time: u64,
    pub p99_time: u64,
    pub timeline: Vec<TimelineBucket>,
    pub elapsed_series: Vec<u64>,
    pub transaction_series: Vec<BTreeMap<String, u64>>,
}
