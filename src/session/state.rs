use crate::error::{FailureReason, Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scanning session lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    Initializing,
    Active,
    Suspended,
    Failed(FailureReason),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPermission => "awaiting_permission",
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
            SessionState::Failed(_) => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed(_))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            SessionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Allowed edges of the session state machine.
    ///
    /// An explicit stop may end the session from any non-idle state.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, AwaitingPermission) => true,
            (AwaitingPermission, Initializing) | (AwaitingPermission, Failed(_)) => true,
            (Initializing, Active) | (Initializing, Failed(_)) => true,
            (Active, Suspended) => true,
            (Suspended, Active) | (Suspended, Failed(_)) => true,
            (Failed(_), AwaitingPermission) => true,
            (Idle, Idle) => false,
            (_, Idle) => true,
            _ => false,
        }
    }
}

impl SessionState {
    pub fn check_transition(&self, next: &SessionState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ScanError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Failed(reason) => write!(f, "failed ({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}
