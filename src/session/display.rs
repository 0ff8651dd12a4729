use crate::events::ScanOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

/// The classified result currently shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedResult {
    pub outcome: ScanOutcome,
    pub shown_at: DateTime<Utc>,
}

/// One-shot timer that posts a message after a delay.
///
/// Arming aborts the previous timer and bumps the generation, so a message
/// that was already queued by a superseded timer is recognised as stale.
#[derive(Debug, Default)]
pub struct ExpiryTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<T, F>(&mut self, delay: Duration, sender: mpsc::UnboundedSender<T>, message: F) -> u64
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;

        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = sender.send(message(generation));
        }));

        generation
    }

    /// Abort the pending timer; returns whether one was pending
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                trace!("Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Accept a fired timer message if it belongs to the current arming
    pub fn complete(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
