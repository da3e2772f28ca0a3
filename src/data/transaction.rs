use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::config::{Step, TransactionSpec};

/// Bytes sent to and received from each step during the current attempt.
#[derive(Debug, Default, Clone)]
pub struct Captures {
    sent: HashMap<String, Bytes>,
    received: HashMap<String, Bytes>,
}

impl Captures {
    pub fn clear(&mut self) {
        self.sent.clear();
        self.received.clear();
    }

    pub fn record_sent(&mut self, step: &str, payload: Bytes) {
        self.sent.insert(step.to_owned(), payload);
    }

    pub fn record_received(&mut self, step: &str, payload: Bytes) {
        self.received.insert(step.to_owned(), payload);
    }

    #[must_use]
    pub fn sent(&self, step: &str) -> Option<&Bytes> {
        self.sent.get(step)
    }

    #[must_use]
    pub fn received(&self, step: &str) -> Option<&Bytes> {
        self.received.get(step)
    }
}

/// Ordered transaction steps plus a wrapping step index.
///
/// The index is advanced with an atomic read-modify-write so the cursor can be
/// shared; the engine hands every worker its own cursor, which keeps step order
/// intact within one worker's attempts.
#[derive(Debug)]
pub struct TransactionCursor {
    steps: Arc<[Step]>,
    index: AtomicUsize,
    captures: Captures,
}

impl TransactionCursor {
    #[must_use]
    pub fn new(spec: &TransactionSpec) -> Self {
        Self::from_steps(Arc::from(spec.steps.clone()))
    }

    #[must_use]
    pub fn from_steps(steps: Arc<[Step]>) -> Self {
        Self {
            steps,
            index: AtomicUsize::new(0),
            captures: Captures::default(),
        }
    }

    #[must_use]
    pub fn steps(&self) -> &Arc<[Step]> {
        &self.steps
    }

    /// Step the next dispatch targets.
    #[must_use]
    pub fn current(&self) -> Option<&Step> {
        let len = self.steps.len();
        if len == 0 {
            return None;
        }
        let idx = self.index.load(Ordering::Acquire).rem_euclid(len);
        self.steps.get(idx)
    }

    /// Index of the step the next dispatch targets.
    #[must_use]
    pub fn position(&self) -> usize {
        let len = self.steps.len();
        if len == 0 {
            return 0;
        }
        self.index.load(Ordering::Acquire).rem_euclid(len)
    }

    /// Moves to the following step, wrapping after the last, and returns the
    /// index that was current before the move.
    pub fn advance(&self) -> usize {
        let len = self.steps.len();
        if len == 0 {
            return 0;
        }
        let previous = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |idx| {
                Some(idx.saturating_add(1).rem_euclid(len))
            })
            .unwrap_or_else(|idx| idx);
        previous.rem_euclid(len)
    }

    /// Rewinds to the first step and forgets the previous attempt's captures.
    pub fn begin_attempt(&mut self) {
        self.index.store(0, Ordering::Release);
        self.captures.clear();
    }

    #[must_use]
    pub const fn captures(&self) -> &Captures {
        &self.captures
    }

    pub fn captures_mut(&mut self) -> &mut Captures {
        &mut self.captures
    }
}
