use super::permission::{CameraPermissions, PermissionQuery};
use crate::error::CameraError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

struct SimulatedPermissionState {
    query: PermissionQuery,
    has_camera: bool,
    probe_error: Option<CameraError>,
    probes: usize,
}

/// In-process camera permission API with scriptable answers
pub struct SimulatedPermissions {
    state: Mutex<SimulatedPermissionState>,
}

impl SimulatedPermissions {
    pub fn new(query: PermissionQuery) -> Self {
        Self {
            state: Mutex::new(SimulatedPermissionState {
                query,
                has_camera: true,
                probe_error: None,
                probes: 0,
            }),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionQuery::Granted)
    }

    pub fn set_query(&self, query: PermissionQuery) {
        self.state.lock().query = query;
    }

    pub fn set_has_camera(&self, has_camera: bool) {
        self.state.lock().has_camera = has_camera;
    }

    /// Make the next probes fail with `error`; `None` clears it
    pub fn set_probe_error(&self, error: Option<CameraError>) {
        self.state.lock().probe_error = error;
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().probes
    }
}

#[async_trait]
impl CameraPermissions for SimulatedPermissions {
    async fn query(&self) -> PermissionQuery {
        self.state.lock().query
    }

    async fn has_video_input(&self) -> Result<bool, CameraError> {
        Ok(self.state.lock().has_camera)
    }

    async fn probe(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        state.probes += 1;

        if let Some(error) = &state.probe_error {
            return Err(error.clone());
        }
        if !state.has_camera {
            return Err(CameraError::NotFound);
        }

        match state.query {
            PermissionQuery::Denied => Err(CameraError::NotAllowed),
            PermissionQuery::Prompt => {
                debug!("Simulated permission prompt accepted");
                state.query = PermissionQuery::Granted;
                Ok(())
            }
            PermissionQuery::Granted | PermissionQuery::Unsupported => Ok(()),
        }
    }
}
