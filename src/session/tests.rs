use super::*;
use crate::config::TicketScanConfig;
use crate::decoder::{CameraSelector, DecoderFrame, HandleId, SimulatedDecoderService};
use crate::error::{CameraError, FailureReason, FeedbackError};
use crate::events::{EventBus, FrameResult, OutcomeClass, ScanEvent, ScanOutcome, SessionEvent};
use crate::feedback::{FeedbackEmitter, HapticOutput, Tone, ToneOutput};
use crate::lifecycle::{LifecycleSignal, PermissionQuery, PermissionState, SimulatedPermissions};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

struct Harness {
    controller: SessionController,
    decoder: Arc<SimulatedDecoderService>,
    permissions: Arc<SimulatedPermissions>,
    events: broadcast::Receiver<SessionEvent>,
}

impl Harness {
    async fn input(&mut self, input: SessionInput) {
        self.controller.handle(input).await;
        self.controller.settle().await;
    }

    async fn start(&mut self) {
        self.input(SessionInput::Start).await;
    }

    async fn present(&mut self, code: &str, ms: i64) {
        assert!(self.decoder.present_code_at(code, at(ms)), "no stream for {}", code);
        self.controller.settle().await;
    }

    fn state(&self) -> &SessionState {
        self.controller.state()
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + ChronoDuration::milliseconds(ms)
}

fn test_config() -> TicketScanConfig {
    let mut config = TicketScanConfig::default();
    config.lifecycle.auto_start = false;
    config
}

fn harness_with(config: TicketScanConfig, permissions: SimulatedPermissions) -> Harness {
    let decoder = Arc::new(SimulatedDecoderService::new());
    let permissions = Arc::new(permissions);
    let event_bus = Arc::new(EventBus::new(256));
    let events = event_bus.subscribe();

    let controller = SessionControllerBuilder::new()
        .config(config)
        .decoder(decoder.clone())
        .permissions(permissions.clone())
        .event_bus(event_bus)
        .build()
        .unwrap();

    Harness {
        controller,
        decoder,
        permissions,
        events,
    }
}

fn harness() -> Harness {
    harness_with(test_config(), SimulatedPermissions::granted())
}

async fn active_harness() -> Harness {
    let mut h = harness();
    h.start().await;
    assert_eq!(h.state(), &SessionState::Active);
    h
}

#[derive(Default)]
struct RecordingFeedback {
    played: Mutex<Vec<Vec<Tone>>>,
}

impl ToneOutput for RecordingFeedback {
    fn initialize(&self) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn play(&self, tones: &[Tone], _volume: f32) -> Result<(), FeedbackError> {
        self.played.lock().push(tones.to_vec());
        Ok(())
    }
}

impl HapticOutput for RecordingFeedback {
    fn vibrate(&self, _pattern_ms: &[u64]) -> Result<(), FeedbackError> {
        Err(FeedbackError::VibrationUnsupported)
    }
}

#[tokio::test]
async fn test_start_reaches_active_with_one_camera() {
    let mut h = harness();
    h.start().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.controller.permission(), PermissionState::Granted);
    assert_eq!(h.decoder.open_count(), 1);
    assert!(h.controller.camera().is_some());
    assert_eq!(h.permissions.probe_count(), 1);

    let transitions: Vec<(String, String)> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to, .. } => {
                Some((from.name().to_string(), to.name().to_string()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("idle".to_string(), "awaiting_permission".to_string()),
            ("awaiting_permission".to_string(), "initializing".to_string()),
            ("initializing".to_string(), "active".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_check_in_scenario_history() {
    let mut h = active_harness().await;

    h.present("A", 0).await;
    h.present("A", 500).await;
    h.present("A", 2500).await;
    h.present("B", 2600).await;

    let history: Vec<(String, OutcomeClass)> = h
        .controller
        .history()
        .iter()
        .map(|e| (e.code.clone(), e.class))
        .collect();
    assert_eq!(
        history,
        vec![
            ("B".to_string(), OutcomeClass::Accepted),
            ("A".to_string(), OutcomeClass::Duplicate),
            ("A".to_string(), OutcomeClass::Accepted),
        ]
    );

    let stats = h.controller.stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.duplicate, 1);
    assert_eq!(stats.suppressed, 1);

    let classified = h
        .drain_events()
        .into_iter()
        .filter(|e| e.event_type() == "scan_classified")
        .count();
    assert_eq!(classified, 3);
}

#[tokio::test]
async fn test_history_never_exceeds_capacity() {
    let mut h = active_harness().await;

    for i in 0..25 {
        h.present(&format!("T-{}", i), i * 10).await;
        assert!(h.controller.history().len() <= 10);
    }

    assert_eq!(h.controller.history().len(), 10);
    assert_eq!(h.controller.history().iter().next().unwrap().code, "T-24");
}

#[tokio::test]
async fn test_frames_without_code_are_counted_not_errors() {
    let mut h = active_harness().await;

    assert!(h.decoder.present_miss());
    assert!(h.decoder.present_miss());
    h.controller.settle().await;

    assert_eq!(h.controller.stats().frames_without_code, 2);
    assert_eq!(h.state(), &SessionState::Active);
    assert!(h.controller.history().is_empty());
    assert!(h.controller.displayed().is_none());
}

#[tokio::test]
async fn test_reset_makes_codes_acceptable_again() {
    let mut h = active_harness().await;
    let first_session = h.controller.session_id();

    h.present("A", 0).await;
    h.present("B", 100).await;
    h.input(SessionInput::Reset).await;

    assert!(h.controller.history().is_empty());
    assert!(h.controller.displayed().is_none());
    assert_ne!(h.controller.session_id(), first_session);
    assert_eq!(h.state(), &SessionState::Active);

    h.present("A", 200).await;
    let latest = h.controller.history().iter().next().unwrap().clone();
    assert_eq!(latest.code, "A");
    assert_eq!(latest.class, OutcomeClass::Accepted);

    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::SessionReset { .. })));
}

#[tokio::test]
async fn test_stop_releases_camera() {
    let mut h = active_harness().await;
    let handle = h.controller.camera().unwrap();

    h.input(SessionInput::Stop).await;

    assert_eq!(h.state(), &SessionState::Idle);
    assert_eq!(h.decoder.open_count(), 0);
    assert!(h.controller.camera().is_none());
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::CameraReleased { handle: released, .. } if *released == handle)));
}

#[tokio::test]
async fn test_stop_swallows_release_errors() {
    let mut h = active_harness().await;
    h.decoder.fail_stops("device busy");

    h.input(SessionInput::Stop).await;

    assert_eq!(h.state(), &SessionState::Idle);
    assert_eq!(h.decoder.open_count(), 0);
}

#[tokio::test]
async fn test_stale_start_after_stop_is_discarded() {
    let mut h = harness();
    h.decoder.hold_starts();

    h.start().await;
    assert_eq!(h.state(), &SessionState::Initializing);

    h.input(SessionInput::Stop).await;
    assert_eq!(h.state(), &SessionState::Idle);

    h.decoder.release_starts();
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Idle);
    assert_eq!(h.decoder.opened_total(), 1);
    assert_eq!(h.decoder.open_count(), 0);
    assert!(h.controller.camera().is_none());
}

#[tokio::test]
async fn test_stop_while_awaiting_permission_forgets_request() {
    let mut h = harness();

    h.controller.handle(SessionInput::Start).await;
    assert_eq!(h.state(), &SessionState::AwaitingPermission);
    assert_eq!(h.controller.permission(), PermissionState::Requesting);

    h.input(SessionInput::Stop).await;

    assert_eq!(h.state(), &SessionState::Idle);
    assert_eq!(h.controller.permission(), PermissionState::Unrequested);
    assert_eq!(h.decoder.opened_total(), 0);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::PermissionChanged {
            permission: PermissionState::Unrequested,
            ..
        }
    )));
}

#[tokio::test]
async fn test_restart_during_pending_start_keeps_single_camera() {
    let mut h = harness();
    h.decoder.hold_starts();

    h.start().await;
    h.input(SessionInput::Stop).await;
    h.start().await;
    assert_eq!(h.state(), &SessionState::Initializing);

    h.decoder.release_starts();
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.opened_total(), 2);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test]
async fn test_frames_from_released_stream_are_ignored() {
    let mut h = active_harness().await;
    let current = h.controller.camera().unwrap();

    h.controller
        .handle_frame(DecoderFrame {
            handle: HandleId(current.0 + 100),
            result: FrameResult::Decoded(ScanEvent::new("GHOST", at(0))),
        })
        .await;

    assert!(h.controller.history().is_empty());
    assert_eq!(h.controller.stats(), ScanStats::default());
}

#[tokio::test]
async fn test_insecure_origin_denial() {
    let mut config = test_config();
    config.lifecycle.origin = "http://192.168.1.20:8080".to_string();
    let permissions = SimulatedPermissions::granted();
    permissions.set_probe_error(Some(CameraError::ApiUnavailable));

    let mut h = harness_with(config, permissions);
    h.start().await;

    assert_eq!(
        h.state(),
        &SessionState::Failed(FailureReason::InsecureContext)
    );
    assert_eq!(h.controller.permission(), PermissionState::Denied);
    assert_eq!(h.decoder.opened_total(), 0);
}

#[tokio::test]
async fn test_secure_origin_denial_is_permission_denied() {
    let mut h = harness_with(test_config(), SimulatedPermissions::new(PermissionQuery::Denied));
    h.start().await;

    assert_eq!(
        h.state(),
        &SessionState::Failed(FailureReason::PermissionDenied)
    );
    // Persistent denial never prompts
    assert_eq!(h.permissions.probe_count(), 0);
}

#[tokio::test]
async fn test_loopback_http_is_treated_as_secure() {
    let mut config = test_config();
    config.lifecycle.origin = "http://127.0.0.1:5173".to_string();
    let permissions = SimulatedPermissions::granted();
    permissions.set_probe_error(Some(CameraError::NotAllowed));

    let mut h = harness_with(config, permissions);
    h.start().await;

    assert_eq!(
        h.state(),
        &SessionState::Failed(FailureReason::PermissionDenied)
    );
}

#[tokio::test]
async fn test_no_camera_found_without_permission_api() {
    let permissions = SimulatedPermissions::new(PermissionQuery::Unsupported);
    permissions.set_has_camera(false);

    let mut h = harness_with(test_config(), permissions);
    h.start().await;

    assert_eq!(h.state(), &SessionState::Failed(FailureReason::NoCameraFound));
    assert_eq!(h.permissions.probe_count(), 0);
}

#[tokio::test]
async fn test_decoder_engine_failure() {
    let mut h = harness();
    h.decoder.fail_engine("wasm module missing");
    h.start().await;

    assert_eq!(
        h.state(),
        &SessionState::Failed(FailureReason::DecoderUnavailable(
            "wasm module missing".to_string()
        ))
    );
    assert_eq!(h.decoder.attempts().len(), 1);
}

#[tokio::test]
async fn test_all_selectors_failing_is_acquisition_failure() {
    let mut h = harness();
    for selector in CameraSelector::default_chain() {
        h.decoder.fail_selector(selector);
    }
    h.start().await;

    assert!(matches!(
        h.state(),
        SessionState::Failed(FailureReason::CameraAcquisitionFailed(_))
    ));
    assert_eq!(h.decoder.attempts(), CameraSelector::default_chain());
    assert_eq!(h.decoder.open_count(), 0);
}

#[tokio::test]
async fn test_selector_fallback_order() {
    let mut h = harness();
    h.decoder.fail_selector(CameraSelector::environment());
    h.start().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(
        h.decoder.attempts(),
        vec![
            CameraSelector::environment(),
            CameraSelector::device("environment"),
        ]
    );
    assert_eq!(
        h.decoder.active_selector(),
        Some(CameraSelector::device("environment"))
    );
}

#[tokio::test]
async fn test_retry_after_failure() {
    let mut h = harness();
    h.decoder.fail_engine("not loaded");
    h.start().await;
    assert!(h.state().is_failed());

    // Start is not the retry entry point
    h.input(SessionInput::Start).await;
    assert!(h.state().is_failed());

    h.decoder.clear_failures();
    h.input(SessionInput::Retry).await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test]
async fn test_permission_grant_after_denial_retries() {
    let mut h = harness_with(test_config(), SimulatedPermissions::new(PermissionQuery::Denied));
    h.start().await;
    assert_eq!(
        h.state(),
        &SessionState::Failed(FailureReason::PermissionDenied)
    );

    h.permissions.set_query(PermissionQuery::Granted);
    h.input(SessionInput::PermissionChanged(PermissionQuery::Granted))
        .await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.controller.permission(), PermissionState::Granted);
}

#[tokio::test]
async fn test_permission_revoked_does_not_stop_active_session() {
    let mut h = active_harness().await;

    h.input(SessionInput::PermissionChanged(PermissionQuery::Denied))
        .await;

    assert_eq!(h.controller.permission(), PermissionState::Denied);
    assert_eq!(h.state(), &SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_background_with_dead_stream_recovers_once() {
    let mut h = active_harness().await;
    let before = h.controller.camera().unwrap();

    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    assert_eq!(h.state(), &SessionState::Suspended);

    h.decoder.kill_streams();
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    assert_eq!(h.state(), &SessionState::Suspended);

    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.opened_total(), 2);
    assert_eq!(h.decoder.open_count(), 1);
    assert_ne!(h.controller.camera(), Some(before));

    // A second resume signal does not open another stream
    h.input(SessionInput::Lifecycle(LifecycleSignal::Focus))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;
    assert_eq!(h.decoder.opened_total(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_with_live_stream_resumes_same_camera() {
    let mut h = active_harness().await;
    let before = h.controller.camera();

    h.input(SessionInput::Lifecycle(LifecycleSignal::Blur)).await;
    h.input(SessionInput::Lifecycle(LifecycleSignal::Focus))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.controller.camera(), before);
    assert_eq!(h.decoder.opened_total(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hide_cancels_pending_restart() {
    let mut h = active_harness().await;

    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    h.decoder.kill_streams();
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    tokio::time::advance(Duration::from_millis(100)).await;

    // Backgrounded again before the restart delay elapsed
    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    tokio::time::advance(Duration::from_millis(1000)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Suspended);
    assert_eq!(h.decoder.opened_total(), 1);

    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;
    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_prior_activity_does_nothing() {
    let mut h = harness();

    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    tokio::time::advance(Duration::from_millis(1000)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Idle);
    assert_eq!(h.decoder.opened_total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restored_page_with_dead_stream_recovers() {
    let mut h = active_harness().await;

    h.decoder.kill_streams();
    h.input(SessionInput::Lifecycle(LifecycleSignal::Restored))
        .await;
    assert_eq!(h.state(), &SessionState::Suspended);

    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_recovery_requires_manual_retry() {
    let mut h = active_harness().await;

    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    h.decoder.kill_streams();
    h.decoder.fail_engine("context lost");
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert!(matches!(
        h.state(),
        SessionState::Failed(FailureReason::RecoveryFailed(_))
    ));
    assert_eq!(h.decoder.open_count(), 0);
    let attempts = h.decoder.attempts().len();

    // No automatic retry loop
    tokio::time::advance(Duration::from_secs(10)).await;
    h.input(SessionInput::Lifecycle(LifecycleSignal::Focus))
        .await;
    tokio::time::advance(Duration::from_secs(10)).await;
    h.controller.settle().await;
    assert_eq!(h.decoder.attempts().len(), attempts);

    h.decoder.clear_failures();
    h.input(SessionInput::Retry).await;
    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scans_while_suspended_are_not_consumed() {
    let mut h = active_harness().await;
    h.input(SessionInput::Lifecycle(LifecycleSignal::Blur)).await;
    assert_eq!(h.state(), &SessionState::Suspended);

    h.present("TICKET-1", 0).await;
    assert_eq!(h.controller.stats().accepted, 0);
    assert!(h.controller.history().is_empty());
    assert!(h.controller.displayed().is_none());

    h.input(SessionInput::Lifecycle(LifecycleSignal::Focus))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;
    assert_eq!(h.state(), &SessionState::Active);

    h.present("TICKET-1", 5000).await;
    let history: Vec<_> = h
        .controller
        .history()
        .iter()
        .map(|entry| (entry.code.clone(), entry.class))
        .collect();
    assert_eq!(history, vec![("TICKET-1".to_string(), OutcomeClass::Accepted)]);
}

#[tokio::test(start_paused = true)]
async fn test_hide_during_recovery_start_discards_it() {
    let mut h = active_harness().await;

    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    h.decoder.kill_streams();
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;

    h.decoder.hold_starts();
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;
    assert_eq!(h.decoder.opened_total(), 1);

    // Backgrounded again while the restart is opening the camera
    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;
    h.decoder.release_starts();
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Suspended);
    assert_eq!(h.decoder.opened_total(), 2);
    assert_eq!(h.decoder.open_count(), 0);
    assert!(h.controller.camera().is_none());

    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.open_count(), 1);
    assert!(h.controller.snapshot().camera.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_start_landing_while_hidden_is_checked_on_resume() {
    let mut h = harness();
    h.decoder.hold_starts();

    h.start().await;
    assert_eq!(h.state(), &SessionState::Initializing);
    h.input(SessionInput::Lifecycle(LifecycleSignal::Hidden))
        .await;

    h.decoder.release_starts();
    h.controller.settle().await;
    assert_eq!(h.state(), &SessionState::Active);

    h.decoder.kill_streams();
    h.input(SessionInput::Lifecycle(LifecycleSignal::Visible))
        .await;
    assert_eq!(h.state(), &SessionState::Suspended);

    tokio::time::advance(Duration::from_millis(300)).await;
    h.controller.settle().await;

    assert_eq!(h.state(), &SessionState::Active);
    assert_eq!(h.decoder.opened_total(), 2);
    assert_eq!(h.decoder.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_displayed_result_auto_clears() {
    let mut h = active_harness().await;

    h.present("A", 0).await;
    assert!(matches!(
        h.controller.displayed().map(|d| &d.outcome),
        Some(ScanOutcome::Accepted { .. })
    ));

    tokio::time::advance(Duration::from_millis(1990)).await;
    h.controller.settle().await;
    assert!(h.controller.displayed().is_some());

    tokio::time::advance(Duration::from_millis(20)).await;
    h.controller.settle().await;
    assert!(h.controller.displayed().is_none());
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::DisplayCleared { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_new_outcome_restarts_display_timer() {
    let mut h = active_harness().await;

    h.present("A", 0).await;
    tokio::time::advance(Duration::from_millis(1500)).await;
    h.controller.settle().await;

    h.present("A", 1500).await; // suppressed, leaves the display alone
    h.present("B", 1600).await;
    tokio::time::advance(Duration::from_millis(1000)).await;
    h.controller.settle().await;

    let shown = h.controller.displayed().map(|d| d.outcome.code().to_string());
    assert_eq!(shown.as_deref(), Some("B"));

    tokio::time::advance(Duration::from_millis(1000)).await;
    h.controller.settle().await;
    assert!(h.controller.displayed().is_none());

    let cleared = h
        .drain_events()
        .iter()
        .filter(|e| matches!(e, SessionEvent::DisplayCleared { .. }))
        .count();
    assert_eq!(cleared, 1);
}

#[tokio::test]
async fn test_feedback_only_after_user_interaction() {
    let output = Arc::new(RecordingFeedback::default());
    let tones: Arc<dyn ToneOutput> = output.clone();
    let haptics: Arc<dyn HapticOutput> = output.clone();

    let decoder = Arc::new(SimulatedDecoderService::new());
    let config = test_config();
    let mut controller = SessionControllerBuilder::new()
        .feedback(FeedbackEmitter::new(
            config.feedback.clone(),
            Some(tones),
            Some(haptics),
        ))
        .config(config)
        .decoder(decoder.clone())
        .permissions(Arc::new(SimulatedPermissions::granted()))
        .build()
        .unwrap();

    controller.handle(SessionInput::Start).await;
    controller.settle().await;

    decoder.present_code_at("A", at(0));
    controller.settle().await;
    assert!(output.played.lock().is_empty());

    controller.handle(SessionInput::UserInteraction).await;
    decoder.present_code_at("B", at(100));
    decoder.present_code_at("A", at(200));
    controller.settle().await;

    let played = output.played.lock();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0].len(), 2);
    assert_eq!(played[1].len(), 1);
}

#[tokio::test]
async fn test_snapshot_carries_remediation() {
    let mut h = harness_with(test_config(), SimulatedPermissions::new(PermissionQuery::Denied));
    h.start().await;

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.permission, PermissionState::Denied);
    assert!(snapshot.camera.is_none());
    assert!(snapshot.remediation.unwrap().contains("permission"));

    let json = serde_json::to_value(h.controller.snapshot()).unwrap();
    assert_eq!(json["state"]["state"], "failed");
    assert_eq!(json["state"]["reason"]["kind"], "PermissionDenied");
}

#[test]
fn test_builder_requires_collaborators() {
    assert!(SessionControllerBuilder::new().build().is_err());
    assert!(SessionControllerBuilder::new()
        .decoder(Arc::new(SimulatedDecoderService::new()))
        .build()
        .is_err());
}

#[test]
fn test_builder_rejects_bad_origin() {
    let mut config = test_config();
    config.lifecycle.origin = "not a url".to_string();

    let result = SessionControllerBuilder::new()
        .config(config)
        .decoder(Arc::new(SimulatedDecoderService::new()))
        .permissions(Arc::new(SimulatedPermissions::granted()))
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_loop_auto_starts_and_releases_on_shutdown() {
    let decoder = Arc::new(SimulatedDecoderService::new());
    let event_bus = Arc::new(EventBus::new(64));
    let mut events = event_bus.subscribe();

    let controller = SessionControllerBuilder::new()
        .config(TicketScanConfig::default())
        .decoder(decoder.clone())
        .permissions(Arc::new(SimulatedPermissions::granted()))
        .event_bus(event_bus)
        .build()
        .unwrap();

    let shutdown = CancellationToken::new();
    let (inputs, task) = controller.spawn(8, shutdown.clone());

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let SessionEvent::StateChanged {
                to: SessionState::Active,
                ..
            } = events.recv().await.unwrap()
            {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert!(decoder.present_code("T-1"));
    inputs.send(SessionInput::UserInteraction).await.unwrap();

    shutdown.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(decoder.open_count(), 0);
}
