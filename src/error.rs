use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl ScanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Errors reported by the camera collaborators (decoder service, permission API)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera access was not allowed")]
    NotAllowed,

    #[error("No camera device found")]
    NotFound,

    #[error("Camera API unavailable in this context")]
    ApiUnavailable,

    #[error("Decode engine unavailable: {details}")]
    EngineUnavailable { details: String },

    #[error("Failed to open camera with {selector}: {details}")]
    Acquisition { selector: String, details: String },

    #[error("Failed to release camera: {details}")]
    Release { details: String },

    #[error("Camera error: {details}")]
    Other { details: String },
}

impl CameraError {
    pub fn other<S: Into<String>>(details: S) -> Self {
        Self::Other {
            details: details.into(),
        }
    }
}

/// Operator-facing failure taxonomy carried by a failed session
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details")]
pub enum FailureReason {
    #[error("camera requires a secure connection")]
    InsecureContext,

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found")]
    NoCameraFound,

    #[error("decoder unavailable: {0}")]
    DecoderUnavailable(String),

    #[error("camera acquisition failed: {0}")]
    CameraAcquisitionFailed(String),

    #[error("recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("unknown camera error: {0}")]
    Unknown(String),
}

impl FailureReason {
    /// Hint shown to the operator next to the retry control
    pub fn remediation(&self) -> String {
        match self {
            FailureReason::InsecureContext => {
                "Camera access needs HTTPS. Open the scanner over https:// or from localhost."
                    .to_string()
            }
            FailureReason::PermissionDenied => {
                "Camera permission was denied. Allow camera access in the browser site settings, then retry."
                    .to_string()
            }
            FailureReason::NoCameraFound => {
                "No camera was detected. Connect a camera or use a device with one, then retry."
                    .to_string()
            }
            FailureReason::DecoderUnavailable(_) => {
                "The QR decoder could not start. Reload the page, then retry.".to_string()
            }
            FailureReason::CameraAcquisitionFailed(_) => {
                "The camera could not be opened. Close other apps using it, then retry."
                    .to_string()
            }
            FailureReason::RecoveryFailed(_) => {
                "Lost connection to the camera. Press retry to restart scanning.".to_string()
            }
            FailureReason::Unknown(details) => {
                format!("Unexpected camera error ({}). Press retry.", details)
            }
        }
    }

    /// Whether the failure stems from the environment rather than the device
    pub fn is_permission_related(&self) -> bool {
        matches!(
            self,
            FailureReason::InsecureContext | FailureReason::PermissionDenied
        )
    }
}

impl From<&CameraError> for FailureReason {
    fn from(error: &CameraError) -> Self {
        match error {
            CameraError::NotAllowed => FailureReason::PermissionDenied,
            CameraError::NotFound => FailureReason::NoCameraFound,
            CameraError::ApiUnavailable => FailureReason::InsecureContext,
            CameraError::EngineUnavailable { details } => {
                FailureReason::DecoderUnavailable(details.clone())
            }
            CameraError::Acquisition { details, .. } => {
                FailureReason::CameraAcquisitionFailed(details.clone())
            }
            CameraError::Release { details } | CameraError::Other { details } => {
                FailureReason::Unknown(details.clone())
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    #[error("Audio output unavailable: {details}")]
    AudioUnavailable { details: String },

    #[error("Vibration unsupported")]
    VibrationUnsupported,

    #[error("Feedback backend failed: {details}")]
    Backend { details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_maps_to_failure_reason() {
        assert_eq!(
            FailureReason::from(&CameraError::NotAllowed),
            FailureReason::PermissionDenied
        );
        assert_eq!(
            FailureReason::from(&CameraError::NotFound),
            FailureReason::NoCameraFound
        );
        assert_eq!(
            FailureReason::from(&CameraError::ApiUnavailable),
            FailureReason::InsecureContext
        );
        assert!(matches!(
            FailureReason::from(&CameraError::EngineUnavailable {
                details: "wasm".to_string()
            }),
            FailureReason::DecoderUnavailable(_)
        ));
    }

    #[test]
    fn test_permission_related_reasons() {
        assert!(FailureReason::InsecureContext.is_permission_related());
        assert!(FailureReason::PermissionDenied.is_permission_related());
        assert!(!FailureReason::NoCameraFound.is_permission_related());
        assert!(!FailureReason::RecoveryFailed("lost".to_string()).is_permission_related());
    }

    #[test]
    fn test_every_reason_has_distinct_remediation() {
        let reasons = vec![
            FailureReason::InsecureContext,
            FailureReason::PermissionDenied,
            FailureReason::NoCameraFound,
            FailureReason::DecoderUnavailable("x".to_string()),
            FailureReason::CameraAcquisitionFailed("x".to_string()),
            FailureReason::RecoveryFailed("x".to_string()),
            FailureReason::Unknown("x".to_string()),
        ];

        let hints: std::collections::HashSet<String> =
            reasons.iter().map(|r| r.remediation()).collect();
        assert_eq!(hints.len(), reasons.len());
    }
}
