use super::display::{DisplayedResult, ExpiryTimer};
use super::state::SessionState;
use crate::config::ScannerConfig;
use crate::decoder::{CameraHandle, DecoderFrame, HandleId};
use crate::error::{CameraError, FailureReason, Result};
use crate::events::{EventBus, FrameResult, ScanEvent, ScanOutcome, SessionEvent};
use crate::feedback::FeedbackEmitter;
use crate::history::{HistoryEntry, ScanHistory};
use crate::ledger::DedupLedger;
use crate::lifecycle::{CameraLifecycleManager, LifecycleSignal, PermissionQuery, PermissionState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Inputs from the operator and the environment
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Scanner mounted or started again after a stop
    Start,
    /// Explicit stop; releases the camera
    Stop,
    /// Operator pressed retry after a failure
    Retry,
    /// Begin a new session: forget seen codes and history
    Reset,
    /// Any explicit tap/click/keypress; arms audio feedback
    UserInteraction,
    Lifecycle(LifecycleSignal),
    PermissionChanged(PermissionQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StartPurpose {
    Initial,
    Recovery,
}

/// Completions of work the controller started asynchronously
#[derive(Debug)]
pub(super) enum Internal {
    AccessChecked {
        attempt: u64,
        result: std::result::Result<(), CameraError>,
    },
    StreamOpened {
        attempt: u64,
        purpose: StartPurpose,
        result: std::result::Result<CameraHandle, CameraError>,
    },
    DisplayExpired {
        generation: u64,
    },
    RecoveryDue {
        generation: u64,
    },
}

/// Counters for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub accepted: u64,
    pub duplicate: u64,
    pub suppressed: u64,
    pub frames_without_code: u64,
}

/// Everything a presentation shell needs to render the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub permission: PermissionState,
    pub camera: Option<HandleId>,
    pub displayed: Option<DisplayedResult>,
    pub history: Vec<HistoryEntry>,
    pub stats: ScanStats,
    pub remediation: Option<String>,
}

/// Top-level scanning session state machine.
///
/// All state is owned here and mutated from a single task. Slow
/// operations (access check, stream start) run as spawned futures and
/// report back tagged with the attempt that issued them; a completion
/// whose attempt or expected state no longer matches is stale and only
/// has its resources released.
pub struct SessionController {
    pub(super) scanner: ScannerConfig,
    pub(super) restart_delay: Duration,
    pub(super) auto_start: bool,
    pub(super) session_id: Uuid,
    pub(super) state: SessionState,
    pub(super) lifecycle: CameraLifecycleManager,
    pub(super) ledger: DedupLedger,
    pub(super) history: ScanHistory,
    pub(super) feedback: FeedbackEmitter,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) displayed: Option<DisplayedResult>,
    pub(super) display_timer: ExpiryTimer,
    pub(super) recovery_timer: ExpiryTimer,
    pub(super) attempt: u64,
    pub(super) stats: ScanStats,
    pub(super) internal_tx: mpsc::UnboundedSender<Internal>,
    pub(super) internal_rx: mpsc::UnboundedReceiver<Internal>,
    pub(super) frames_rx: mpsc::UnboundedReceiver<DecoderFrame>,
    pub(super) snapshots: Option<watch::Sender<SessionSnapshot>>,
}

impl SessionController {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn permission(&self) -> PermissionState {
        self.lifecycle.permission()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn history(&self) -> &ScanHistory {
        &self.history
    }

    pub fn displayed(&self) -> Option<&DisplayedResult> {
        self.displayed.as_ref()
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn camera(&self) -> Option<HandleId> {
        self.lifecycle.current_handle()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            state: self.state.clone(),
            permission: self.lifecycle.permission(),
            camera: self.lifecycle.current_handle(),
            displayed: self.displayed.clone(),
            history: self.history.to_vec(),
            stats: self.stats,
            remediation: self.state.failure().map(|r| r.remediation()),
        }
    }

    /// Receiver that sees a fresh snapshot after every handled input
    pub fn watch_snapshots(&mut self) -> watch::Receiver<SessionSnapshot> {
        match &self.snapshots {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(self.snapshot());
                self.snapshots = Some(tx);
                rx
            }
        }
    }

    fn publish_snapshot(&self) {
        if let Some(tx) = &self.snapshots {
            tx.send_replace(self.snapshot());
        }
    }

    /// Run the session until `shutdown` fires or the input channel closes
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<SessionInput>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("Scanning session {} running", self.session_id);

        if self.auto_start {
            self.start();
        }
        self.publish_snapshot();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Session shutdown requested");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => self.handle(input).await,
                    None => {
                        debug!("Session input channel closed");
                        break;
                    }
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
                Some(frame) = self.frames_rx.recv() => self.handle_frame(frame).await,
            }
            self.publish_snapshot();
        }

        self.stop().await;
        self.publish_snapshot();
        info!("Scanning session {} finished", self.session_id);
        Ok(())
    }

    /// Spawn [`SessionController::run`] and return its input sender
    pub fn spawn(
        self,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> (mpsc::Sender<SessionInput>, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let task = tokio::spawn(self.run(rx, shutdown));
        (tx, task)
    }

    pub async fn handle(&mut self, input: SessionInput) {
        trace!("Session input {:?} in {}", input, self.state);

        match input {
            SessionInput::Start => self.start(),
            SessionInput::Stop => self.stop().await,
            SessionInput::Retry => {
                self.feedback.note_user_interaction();
                self.retry();
            }
            SessionInput::Reset => self.reset(),
            SessionInput::UserInteraction => self.feedback.note_user_interaction(),
            SessionInput::Lifecycle(signal) => self.on_lifecycle(signal).await,
            SessionInput::PermissionChanged(query) => self.on_permission_changed(query),
        }
    }

    pub(super) async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::AccessChecked { attempt, result } => {
                self.on_access_checked(attempt, result)
            }
            Internal::StreamOpened {
                attempt,
                purpose,
                result,
            } => self.on_stream_opened(attempt, purpose, result).await,
            Internal::DisplayExpired { generation } => self.on_display_expired(generation),
            Internal::RecoveryDue { generation } => self.on_recovery_due(generation).await,
        }
    }

    pub(super) async fn handle_frame(&mut self, frame: DecoderFrame) {
        if self.lifecycle.current_handle() != Some(frame.handle) {
            trace!("Dropping frame from released stream {}", frame.handle);
            return;
        }

        match frame.result {
            FrameResult::NoCode => {
                self.stats.frames_without_code += 1;
            }
            FrameResult::Decoded(event) => self.on_scan(event),
        }
    }

    fn start(&mut self) {
        match self.state {
            SessionState::Idle => self.begin_access_check(),
            _ => debug!("Start ignored while {}", self.state),
        }
    }

    fn retry(&mut self) {
        match self.state {
            SessionState::Failed(_) | SessionState::Idle => self.begin_access_check(),
            _ => debug!("Retry ignored while {}", self.state),
        }
    }

    async fn stop(&mut self) {
        if self.state == SessionState::Idle {
            debug!("Stop ignored, session already idle");
            return;
        }

        // Anything still in flight is now stale
        self.attempt += 1;
        self.display_timer.cancel();
        self.recovery_timer.cancel();
        self.displayed = None;
        self.lifecycle.clear_suspend_flag();
        if self.lifecycle.abandon_access() {
            self.publish_permission();
        }
        self.release_camera().await;
        self.transition(SessionState::Idle);
    }

    fn reset(&mut self) {
        self.ledger.reset();
        self.history.clear();
        self.display_timer.cancel();
        self.displayed = None;
        self.stats = ScanStats::default();
        self.session_id = Uuid::new_v4();

        self.publish(SessionEvent::SessionReset {
            session_id: self.session_id,
            timestamp: Utc::now(),
        });
    }

    fn begin_access_check(&mut self) {
        if !self.transition(SessionState::AwaitingPermission) {
            return;
        }

        self.attempt += 1;
        let attempt = self.attempt;
        let check = self.lifecycle.request_access();
        self.publish_permission();

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = check.await;
            let _ = tx.send(Internal::AccessChecked { attempt, result });
        });
    }

    fn on_access_checked(&mut self, attempt: u64, result: std::result::Result<(), CameraError>) {
        if attempt != self.attempt || self.state != SessionState::AwaitingPermission {
            debug!("Ignoring stale access check (attempt {})", attempt);
            return;
        }

        let resolved = self.lifecycle.resolve_access(result);
        self.publish_permission();

        match resolved {
            Ok(()) => {
                if self.transition(SessionState::Initializing) {
                    self.begin_open(StartPurpose::Initial);
                }
            }
            Err(reason) => {
                self.transition(SessionState::Failed(reason));
            }
        }
    }

    fn begin_open(&mut self, purpose: StartPurpose) {
        self.attempt += 1;
        let attempt = self.attempt;
        let open = self.lifecycle.open_stream();

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = open.await;
            let _ = tx.send(Internal::StreamOpened {
                attempt,
                purpose,
                result,
            });
        });
    }

    async fn on_stream_opened(
        &mut self,
        attempt: u64,
        purpose: StartPurpose,
        result: std::result::Result<CameraHandle, CameraError>,
    ) {
        let expected = match purpose {
            StartPurpose::Initial => SessionState::Initializing,
            StartPurpose::Recovery => SessionState::Suspended,
        };

        if attempt != self.attempt || self.state != expected {
            debug!(
                "Stale camera start resolved while {} (attempt {})",
                self.state, attempt
            );
            if let Ok(handle) = result {
                self.lifecycle.discard(handle).await;
            }
            return;
        }

        match result {
            Ok(handle) => {
                let id = self.lifecycle.adopt(handle).await;
                self.publish(SessionEvent::CameraOpened {
                    handle: id,
                    timestamp: Utc::now(),
                });
                self.transition(SessionState::Active);
            }
            Err(e) => {
                let reason = match purpose {
                    StartPurpose::Initial => FailureReason::from(&e),
                    StartPurpose::Recovery => {
                        FailureReason::RecoveryFailed(format!("lost connection: {}", e))
                    }
                };
                self.transition(SessionState::Failed(reason));
            }
        }
    }

    fn on_scan(&mut self, event: ScanEvent) {
        // Outcomes outside Active are never shown; keep them out of the ledger
        if !self.state.is_active() {
            debug!("Ignoring '{}' decoded while {}", event.code, self.state);
            return;
        }

        let outcome = self.ledger.classify(&event);

        let class = match outcome.class() {
            Some(class) => class,
            None => {
                self.stats.suppressed += 1;
                return;
            }
        };

        match outcome {
            ScanOutcome::Accepted { .. } => self.stats.accepted += 1,
            _ => self.stats.duplicate += 1,
        }

        self.history.record(&outcome);
        self.show(outcome.clone());
        self.feedback.emit(class.into());
        self.publish(SessionEvent::ScanClassified {
            outcome,
            timestamp: Utc::now(),
        });
    }

    fn show(&mut self, outcome: ScanOutcome) {
        self.displayed = Some(DisplayedResult {
            outcome,
            shown_at: Utc::now(),
        });

        self.display_timer.arm(
            self.scanner.display_window(),
            self.internal_tx.clone(),
            |generation| Internal::DisplayExpired { generation },
        );
    }

    fn on_display_expired(&mut self, generation: u64) {
        if !self.display_timer.complete(generation) {
            trace!("Ignoring superseded display timer");
            return;
        }

        self.displayed = None;
        self.publish(SessionEvent::DisplayCleared {
            timestamp: Utc::now(),
        });
    }

    async fn on_lifecycle(&mut self, signal: LifecycleSignal) {
        if signal.is_backgrounding() {
            let active = self.state.is_active();
            // A start still in flight may land while hidden; check again on resume
            let scanning = matches!(
                self.state,
                SessionState::Active | SessionState::Suspended | SessionState::Initializing
            );
            self.lifecycle.note_backgrounded(scanning);
            self.recovery_timer.cancel();
            if active {
                self.transition(SessionState::Suspended);
            } else if self.state == SessionState::Suspended {
                // Supersede a recovery start that is already running
                self.attempt += 1;
            }
            return;
        }

        let resume_requested = self.lifecycle.take_resume_request();

        if self.state.is_active() {
            // A page restored from cache may never have reported being hidden
            let check = resume_requested || signal == LifecycleSignal::Restored;
            if check && !self.lifecycle.stream_is_live() {
                info!("Camera stream died while backgrounded");
                if self.transition(SessionState::Suspended) {
                    self.schedule_recovery();
                }
            }
            return;
        }

        if !resume_requested {
            trace!("{:?} with nothing to recover", signal);
            return;
        }

        if self.state != SessionState::Suspended {
            debug!("Resume skipped, session is {}", self.state);
            return;
        }

        self.schedule_recovery();
    }

    fn schedule_recovery(&mut self) {
        debug!("Camera recovery in {:?}", self.restart_delay);
        self.recovery_timer.arm(
            self.restart_delay,
            self.internal_tx.clone(),
            |generation| Internal::RecoveryDue { generation },
        );
    }

    async fn on_recovery_due(&mut self, generation: u64) {
        if !self.recovery_timer.complete(generation) {
            trace!("Ignoring superseded recovery timer");
            return;
        }

        if self.state != SessionState::Suspended {
            debug!("Recovery skipped, session is {}", self.state);
            return;
        }

        if self.lifecycle.stream_is_live() {
            info!("Camera stream survived suspension, resuming");
            self.transition(SessionState::Active);
            return;
        }

        warn!("Camera stream died while suspended, restarting decoder");
        self.release_camera().await;
        self.begin_open(StartPurpose::Recovery);
    }

    fn on_permission_changed(&mut self, query: PermissionQuery) {
        if !self.lifecycle.apply_permission_change(query) {
            return;
        }
        self.publish_permission();

        if self.lifecycle.permission() == PermissionState::Granted
            && self.state == SessionState::Failed(FailureReason::PermissionDenied)
        {
            info!("Camera permission granted after denial, retrying");
            self.begin_access_check();
        }
    }

    async fn release_camera(&mut self) {
        if let Some(handle) = self.lifecycle.release().await {
            self.publish(SessionEvent::CameraReleased {
                handle,
                timestamp: Utc::now(),
            });
        }
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if let Err(e) = self.state.check_transition(&next) {
            warn!("Refusing transition: {}", e);
            return false;
        }

        let from = std::mem::replace(&mut self.state, next.clone());
        if let SessionState::Failed(reason) = &next {
            warn!("Session failed: {} ({})", reason, reason.remediation());
        }

        self.publish(SessionEvent::StateChanged {
            from,
            to: next,
            timestamp: Utc::now(),
        });
        true
    }

    fn publish_permission(&self) {
        self.publish(SessionEvent::PermissionChanged {
            permission: self.lifecycle.permission(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            debug!("Session event not delivered: {}", e);
        }
    }

    /// Drain completions and frames until nothing more arrives
    #[cfg(test)]
    pub(crate) async fn settle(&mut self) {
        loop {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }

            let mut progressed = false;
            while let Ok(internal) = self.internal_rx.try_recv() {
                self.handle_internal(internal).await;
                progressed = true;
            }
            while let Ok(frame) = self.frames_rx.try_recv() {
                self.handle_frame(frame).await;
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }
}
