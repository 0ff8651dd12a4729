use super::permission::{
    check_camera_access, classify_denial, CameraPermissions, PermissionQuery, PermissionState,
    SecureOrigin,
};
use crate::decoder::{CameraHandle, CameraSelector, DecodeSettings, DecoderAdapter, HandleId};
use crate::error::{CameraError, FailureReason};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sole owner of the camera handle.
///
/// Tracks permission independently of the session state, opens and
/// releases the decoder stream, and remembers whether the session was
/// active when the page was backgrounded.
pub struct CameraLifecycleManager {
    adapter: Arc<DecoderAdapter>,
    permissions: Arc<dyn CameraPermissions>,
    origin: SecureOrigin,
    selectors: Arc<[CameraSelector]>,
    settings: DecodeSettings,
    permission: PermissionState,
    handle: Option<CameraHandle>,
    was_active_before_suspend: bool,
}

impl CameraLifecycleManager {
    pub fn new(
        adapter: Arc<DecoderAdapter>,
        permissions: Arc<dyn CameraPermissions>,
        origin: SecureOrigin,
        selectors: Vec<CameraSelector>,
        settings: DecodeSettings,
    ) -> Self {
        if !origin.is_secure_context() {
            warn!(
                "Scanner origin {} is not a secure context; camera access will be refused",
                origin.as_str()
            );
        }

        Self {
            adapter,
            permissions,
            origin,
            selectors: selectors.into(),
            settings,
            permission: PermissionState::Unrequested,
            handle: None,
            was_active_before_suspend: false,
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn origin(&self) -> &SecureOrigin {
        &self.origin
    }

    /// Enter `Requesting` and return the access check to run.
    ///
    /// The returned future owns everything it needs so it can be spawned.
    pub fn request_access(&mut self) -> impl Future<Output = Result<(), CameraError>> + Send + 'static {
        self.permission = PermissionState::Requesting;
        let permissions = Arc::clone(&self.permissions);
        async move { check_camera_access(permissions.as_ref()).await }
    }

    /// Record the result of an access check
    pub fn resolve_access(&mut self, result: Result<(), CameraError>) -> Result<(), FailureReason> {
        match result {
            Ok(()) => {
                info!("Camera permission granted");
                self.permission = PermissionState::Granted;
                Ok(())
            }
            Err(e) => {
                let reason = classify_denial(&e, &self.origin);
                warn!("Camera access refused ({}): {}", e, reason);
                self.permission = PermissionState::Denied;
                Err(reason)
            }
        }
    }

    /// Forget a permission request nobody is waiting on any more
    pub fn abandon_access(&mut self) -> bool {
        if self.permission == PermissionState::Requesting {
            self.permission = PermissionState::Unrequested;
            true
        } else {
            false
        }
    }

    /// Apply a change notification from the platform permission API.
    /// Returns true when the tracked state changed.
    pub fn apply_permission_change(&mut self, query: PermissionQuery) -> bool {
        let next = match query {
            PermissionQuery::Granted => PermissionState::Granted,
            PermissionQuery::Denied => PermissionState::Denied,
            PermissionQuery::Prompt => PermissionState::Unrequested,
            PermissionQuery::Unsupported => self.permission,
        };

        let changed = next != self.permission;
        if changed {
            debug!("Permission {:?} -> {:?}", self.permission, next);
            self.permission = next;
        }
        changed
    }

    /// Future that walks the selector chain and opens a stream
    pub fn open_stream(
        &self,
    ) -> impl Future<Output = Result<CameraHandle, CameraError>> + Send + 'static {
        let adapter = Arc::clone(&self.adapter);
        let selectors = Arc::clone(&self.selectors);
        let settings = self.settings;
        async move { adapter.start(&selectors, &settings).await }
    }

    /// Take ownership of a freshly opened stream
    pub async fn adopt(&mut self, handle: CameraHandle) -> HandleId {
        if let Some(previous) = self.handle.take() {
            warn!(
                "Replacing open camera stream {} with {}",
                previous.id(),
                handle.id()
            );
            self.discard(previous).await;
        }

        let id = handle.id();
        self.handle = Some(handle);
        id
    }

    /// Release the owned stream, if any. Release errors are logged, not returned.
    pub async fn release(&mut self) -> Option<HandleId> {
        let handle = self.handle.take()?;
        let id = handle.id();
        self.discard(handle).await;
        Some(id)
    }

    /// Stop a handle the session no longer wants
    pub async fn discard(&self, mut handle: CameraHandle) {
        if let Err(e) = self.adapter.stop(&mut handle).await {
            warn!("Ignoring error while releasing {}: {}", handle.id(), e);
        }
    }

    pub fn current_handle(&self) -> Option<HandleId> {
        self.handle.as_ref().map(|h| h.id())
    }

    /// True only when the owned stream is running with a live, sized track
    pub fn stream_is_live(&self) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            return false;
        };

        if !self.adapter.is_running(handle) {
            return false;
        }

        match self.adapter.stream_status(handle) {
            Some(status) => status.is_producing(),
            None => false,
        }
    }

    /// Remember that the page went to the background while scanning
    pub fn note_backgrounded(&mut self, session_active: bool) {
        if session_active {
            self.was_active_before_suspend = true;
        }
    }

    /// Consume the suspend flag; true at most once per suspension
    pub fn take_resume_request(&mut self) -> bool {
        std::mem::take(&mut self.was_active_before_suspend)
    }

    pub fn clear_suspend_flag(&mut self) {
        self.was_active_before_suspend = false;
    }
}
