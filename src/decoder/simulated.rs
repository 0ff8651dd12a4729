use super::adapter::{DecoderService, FrameSink, HandleId, StreamStatus};
use super::selector::CameraSelector;
use super::settings::DecodeSettings;
use crate::error::CameraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

struct SimulatedStream {
    sink: FrameSink,
    selector: CameraSelector,
    status: StreamStatus,
}

#[derive(Default)]
struct SimulatedState {
    streams: BTreeMap<HandleId, SimulatedStream>,
    failing_selectors: HashSet<CameraSelector>,
    engine_failure: Option<String>,
    stop_failure: Option<String>,
    attempts: Vec<CameraSelector>,
    opened_total: usize,
}

/// In-process decoder service: ticket codes are "presented" to the camera
/// by calling [`SimulatedDecoderService::present_code`].
///
/// Used by the operator console and by the session tests.
pub struct SimulatedDecoderService {
    state: Mutex<SimulatedState>,
    gate: Mutex<Option<Arc<Notify>>>,
    resolution: (u32, u32),
}

impl SimulatedDecoderService {
    pub fn new() -> Self {
        Self::with_resolution((1280, 720))
    }

    pub fn with_resolution(resolution: (u32, u32)) -> Self {
        Self {
            state: Mutex::new(SimulatedState::default()),
            gate: Mutex::new(None),
            resolution,
        }
    }

    /// Make every start with this selector fail to acquire a stream
    pub fn fail_selector(&self, selector: CameraSelector) {
        self.state.lock().failing_selectors.insert(selector);
    }

    /// Make the decode engine itself fail to initialize
    pub fn fail_engine<S: Into<String>>(&self, details: S) {
        self.state.lock().engine_failure = Some(details.into());
    }

    /// Make stop calls report an error (the stream is still released)
    pub fn fail_stops<S: Into<String>>(&self, details: S) {
        self.state.lock().stop_failure = Some(details.into());
    }

    /// Forget every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_selectors.clear();
        state.engine_failure = None;
        state.stop_failure = None;
    }

    /// Hold every subsequent start until the returned notifier fires
    pub fn hold_starts(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    /// Stop holding starts
    pub fn release_starts(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.notify_waiters();
        }
    }

    /// Present a ticket code to the newest open stream
    pub fn present_code(&self, code: &str) -> bool {
        self.present_code_at(code, Utc::now())
    }

    pub fn present_code_at(&self, code: &str, decoded_at: DateTime<Utc>) -> bool {
        let state = self.state.lock();
        match state.streams.values().next_back() {
            Some(stream) if stream.status.is_producing() => {
                trace!("Presenting '{}' to {}", code, stream.sink.handle());
                stream.sink.decoded(code, decoded_at)
            }
            _ => {
                debug!("No producing camera stream to present '{}' to", code);
                false
            }
        }
    }

    /// Deliver a frame with no code in it
    pub fn present_miss(&self) -> bool {
        let state = self.state.lock();
        match state.streams.values().next_back() {
            Some(stream) if stream.status.is_producing() => stream.sink.miss(),
            _ => false,
        }
    }

    /// Simulate the OS silently ending every track while handles stay open
    pub fn kill_streams(&self) {
        let mut state = self.state.lock();
        for stream in state.streams.values_mut() {
            stream.status = StreamStatus::ended();
        }
    }

    /// Number of streams currently open
    pub fn open_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Number of streams ever opened
    pub fn opened_total(&self) -> usize {
        self.state.lock().opened_total
    }

    /// Selectors tried so far, in order
    pub fn attempts(&self) -> Vec<CameraSelector> {
        self.state.lock().attempts.clone()
    }

    /// Selector of the newest open stream
    pub fn active_selector(&self) -> Option<CameraSelector> {
        self.state
            .lock()
            .streams
            .values()
            .next_back()
            .map(|s| s.selector.clone())
    }
}

impl Default for SimulatedDecoderService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecoderService for SimulatedDecoderService {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn start(
        &self,
        id: HandleId,
        selector: &CameraSelector,
        settings: &DecodeSettings,
        sink: FrameSink,
    ) -> Result<(), CameraError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        state.attempts.push(selector.clone());

        if let Some(details) = &state.engine_failure {
            return Err(CameraError::EngineUnavailable {
                details: details.clone(),
            });
        }

        if state.failing_selectors.contains(selector) {
            return Err(CameraError::Acquisition {
                selector: selector.to_string(),
                details: "no matching camera stream".to_string(),
            });
        }

        debug!(
            "Simulated stream {} opened with {} (box {}px)",
            id, selector, settings.box_size
        );
        state.streams.insert(
            id,
            SimulatedStream {
                sink,
                selector: selector.clone(),
                status: StreamStatus::live(self.resolution.0, self.resolution.1),
            },
        );
        state.opened_total += 1;
        Ok(())
    }

    async fn stop(&self, id: HandleId) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        state.streams.remove(&id);

        match &state.stop_failure {
            Some(details) => Err(CameraError::Release {
                details: details.clone(),
            }),
            None => Ok(()),
        }
    }

    fn is_running(&self, id: HandleId) -> bool {
        self.state.lock().streams.contains_key(&id)
    }

    fn stream_status(&self, id: HandleId) -> Option<StreamStatus> {
        self.state.lock().streams.get(&id).map(|s| s.status)
    }
}
