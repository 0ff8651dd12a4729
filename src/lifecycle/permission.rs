use crate::error::{CameraError, FailureReason};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::{Host, Url};

/// Camera permission as tracked by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Unrequested,
    Requesting,
    Granted,
    Denied,
}

/// Answer from the persistent permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionQuery {
    Granted,
    Denied,
    /// The user has not decided yet; acquiring a stream will prompt
    Prompt,
    /// The platform cannot answer permission queries
    Unsupported,
}

/// Camera permission API of the host platform
#[async_trait]
pub trait CameraPermissions: Send + Sync {
    async fn query(&self) -> PermissionQuery;

    /// Whether any video input device is enumerated
    async fn has_video_input(&self) -> Result<bool, CameraError>;

    /// Acquire a camera stream and release it immediately
    async fn probe(&self) -> Result<(), CameraError>;
}

/// Decide whether the camera can be used, without starting the decoder.
///
/// A persisted denial short-circuits; when the platform cannot answer
/// permission queries, device enumeration is used to detect a missing
/// camera before prompting.
pub async fn check_camera_access(permissions: &dyn CameraPermissions) -> Result<(), CameraError> {
    match permissions.query().await {
        PermissionQuery::Denied => {
            debug!("Camera permission persistently denied");
            return Err(CameraError::NotAllowed);
        }
        PermissionQuery::Unsupported => match permissions.has_video_input().await {
            Ok(false) => return Err(CameraError::NotFound),
            Ok(true) => {}
            Err(e) => debug!("Device enumeration failed, probing anyway: {}", e),
        },
        PermissionQuery::Granted | PermissionQuery::Prompt => {}
    }

    permissions.probe().await
}

/// The origin the scanner is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureOrigin {
    url: Url,
}

impl SecureOrigin {
    pub fn parse(origin: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(origin)?,
        })
    }

    pub fn is_loopback(&self) -> bool {
        match self.url.host() {
            Some(Host::Domain(domain)) => {
                domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
            }
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        }
    }

    /// Camera APIs are only exposed over secure transport or on loopback
    pub fn is_secure_context(&self) -> bool {
        matches!(self.url.scheme(), "https" | "wss") || self.is_loopback()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Map a failed access check to the operator-facing reason
pub fn classify_denial(error: &CameraError, origin: &SecureOrigin) -> FailureReason {
    if !origin.is_secure_context() {
        return FailureReason::InsecureContext;
    }

    match error {
        CameraError::ApiUnavailable => {
            FailureReason::Unknown("camera API unavailable in this browser".to_string())
        }
        other => FailureReason::from(other),
    }
}
