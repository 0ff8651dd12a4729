use crate::decoder::HandleId;
use crate::error::EventBusError;
use crate::lifecycle::PermissionState;
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One successful frame decode, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub code: String,
    pub decoded_at: DateTime<Utc>,
    /// Whatever the decoder attached to the result; never interpreted here
    pub raw_result: serde_json::Value,
}

impl ScanEvent {
    pub fn new<S: Into<String>>(code: S, decoded_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            decoded_at,
            raw_result: serde_json::Value::Null,
        }
    }

    pub fn with_raw_result(mut self, raw_result: serde_json::Value) -> Self {
        self.raw_result = raw_result;
        self
    }
}

/// What the decoder reports for each processed frame.
///
/// `NoCode` is the normal state between tickets and is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameResult {
    Decoded(ScanEvent),
    NoCode,
}

/// Classification of a decoded code against session memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Accepted { code: String, at: DateTime<Utc> },
    Duplicate { code: String, at: DateTime<Utc> },
    /// Same code re-read inside the debounce window
    Suppressed { code: String },
}

impl ScanOutcome {
    pub fn code(&self) -> &str {
        match self {
            ScanOutcome::Accepted { code, .. }
            | ScanOutcome::Duplicate { code, .. }
            | ScanOutcome::Suppressed { code } => code,
        }
    }

    /// Feedback class for visible outcomes; `None` for suppressed reads
    pub fn class(&self) -> Option<OutcomeClass> {
        match self {
            ScanOutcome::Accepted { .. } => Some(OutcomeClass::Accepted),
            ScanOutcome::Duplicate { .. } => Some(OutcomeClass::Duplicate),
            ScanOutcome::Suppressed { .. } => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, ScanOutcome::Suppressed { .. })
    }
}

/// Outcome classes the operator can see and hear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Accepted,
    Duplicate,
}

/// Events published by the session controller for presentation and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session state machine moved
    StateChanged {
        from: SessionState,
        to: SessionState,
        timestamp: DateTime<Utc>,
    },
    /// A decoded code was classified as accepted or duplicate
    ScanClassified {
        outcome: ScanOutcome,
        timestamp: DateTime<Utc>,
    },
    /// The displayed result expired and the UI is back to ready
    DisplayCleared { timestamp: DateTime<Utc> },
    /// Camera permission state changed
    PermissionChanged {
        permission: PermissionState,
        timestamp: DateTime<Utc>,
    },
    /// Seen codes and history were cleared for a new session
    SessionReset {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// A camera stream was opened for the decoder
    CameraOpened {
        handle: HandleId,
        timestamp: DateTime<Utc>,
    },
    /// The camera stream was released
    CameraReleased {
        handle: HandleId,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::StateChanged { timestamp, .. }
            | SessionEvent::ScanClassified { timestamp, .. }
            | SessionEvent::DisplayCleared { timestamp }
            | SessionEvent::PermissionChanged { timestamp, .. }
            | SessionEvent::SessionReset { timestamp, .. }
            | SessionEvent::CameraOpened { timestamp, .. }
            | SessionEvent::CameraReleased { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::StateChanged { from, to, .. } => {
                format!("Session {} -> {}", from, to)
            }
            SessionEvent::ScanClassified { outcome, .. } => match outcome {
                ScanOutcome::Accepted { code, .. } => format!("ACCEPTED {}", code),
                ScanOutcome::Duplicate { code, .. } => format!("DUPLICATE {}", code),
                ScanOutcome::Suppressed { code } => format!("suppressed {}", code),
            },
            SessionEvent::DisplayCleared { .. } => "Ready to scan".to_string(),
            SessionEvent::PermissionChanged { permission, .. } => {
                format!("Camera permission {:?}", permission)
            }
            SessionEvent::SessionReset { session_id, .. } => {
                format!("Session reset ({})", session_id)
            }
            SessionEvent::CameraOpened { handle, .. } => format!("Camera {} opened", handle),
            SessionEvent::CameraReleased { handle, .. } => {
                format!("Camera {} released", handle)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::ScanClassified { .. } => "scan_classified",
            SessionEvent::DisplayCleared { .. } => "display_cleared",
            SessionEvent::PermissionChanged { .. } => "permission_changed",
            SessionEvent::SessionReset { .. } => "session_reset",
            SessionEvent::CameraOpened { .. } => "camera_opened",
            SessionEvent::CameraReleased { .. } => "camera_released",
        }
    }
}

/// Session event bus using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers; no subscribers is not an error
    pub fn publish(&self, event: SessionEvent) -> Result<usize, EventBusError> {
        match &event {
            SessionEvent::StateChanged { from, to, .. } => {
                info!("Session state {} -> {}", from, to);
            }
            SessionEvent::SessionReset { session_id, .. } => {
                info!("Session reset, new session {}", session_id);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<SessionEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event. A lagged receiver skips ahead.
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SessionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
