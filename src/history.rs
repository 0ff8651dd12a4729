use crate::events::{OutcomeClass, ScanOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// One visible outcome in the scan history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub code: String,
    pub class: OutcomeClass,
    pub at: DateTime<Utc>,
}

/// Bounded, most-recent-first list of accepted and duplicate outcomes
#[derive(Debug, Clone)]
pub struct ScanHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl ScanHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an outcome. Suppressed reads are ignored; returns whether it was recorded.
    pub fn record(&mut self, outcome: &ScanOutcome) -> bool {
        let (code, class, at) = match outcome {
            ScanOutcome::Accepted { code, at } => (code, OutcomeClass::Accepted, *at),
            ScanOutcome::Duplicate { code, at } => (code, OutcomeClass::Duplicate, *at),
            ScanOutcome::Suppressed { .. } => return false,
        };

        self.entries.push_front(HistoryEntry {
            code: code.clone(),
            class,
            at,
        });

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                trace!("History full, evicted '{}'", evicted.code);
            }
        }

        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, most recent first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
