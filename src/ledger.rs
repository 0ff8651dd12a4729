use crate::events::{ScanEvent, ScanOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace};

/// Most recent sighting of any code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSighting {
    pub code: String,
    pub at: DateTime<Utc>,
}

/// Session-scoped memory of what has been scanned
#[derive(Debug, Default, Clone)]
pub struct SessionMemory {
    seen_codes: HashSet<String>,
    last_sighting: Option<LastSighting>,
}

impl SessionMemory {
    pub fn seen_count(&self) -> usize {
        self.seen_codes.len()
    }

    pub fn has_seen(&self, code: &str) -> bool {
        self.seen_codes.contains(code)
    }

    pub fn last_sighting(&self) -> Option<&LastSighting> {
        self.last_sighting.as_ref()
    }
}

/// Classifies raw decode events as accepted, duplicate or suppressed.
///
/// Debounce is checked before duplicate detection: a code read again
/// strictly less than `debounce_window` after the previous sighting of the
/// same code is suppressed and does not refresh the sighting.
pub struct DedupLedger {
    memory: SessionMemory,
    debounce_window: chrono::Duration,
}

impl DedupLedger {
    pub fn new(debounce_window: Duration) -> Self {
        let millis = debounce_window.as_millis().min(u32::MAX as u128) as i64;
        let debounce_window = chrono::Duration::milliseconds(millis);

        Self {
            memory: SessionMemory::default(),
            debounce_window,
        }
    }

    pub fn classify(&mut self, event: &ScanEvent) -> ScanOutcome {
        if let Some(last) = &self.memory.last_sighting {
            // Negative elapsed (clock skew) also lands inside the window
            if last.code == event.code && event.decoded_at - last.at < self.debounce_window {
                trace!("Suppressed re-read of '{}'", event.code);
                return ScanOutcome::Suppressed {
                    code: event.code.clone(),
                };
            }
        }

        self.memory.last_sighting = Some(LastSighting {
            code: event.code.clone(),
            at: event.decoded_at,
        });

        if self.memory.seen_codes.contains(&event.code) {
            debug!("Duplicate ticket '{}'", event.code);
            return ScanOutcome::Duplicate {
                code: event.code.clone(),
                at: event.decoded_at,
            };
        }

        self.memory.seen_codes.insert(event.code.clone());
        debug!(
            "Accepted ticket '{}' ({} seen this session)",
            event.code,
            self.memory.seen_codes.len()
        );
        ScanOutcome::Accepted {
            code: event.code.clone(),
            at: event.decoded_at,
        }
    }

    /// Forget every code; only called when a new session starts
    pub fn reset(&mut self) {
        debug!(
            "Clearing session memory ({} codes)",
            self.memory.seen_codes.len()
        );
        self.memory = SessionMemory::default();
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }
}
