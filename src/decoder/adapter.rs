use super::selector::CameraSelector;
use super::settings::DecodeSettings;
use crate::error::CameraError;
use crate::events::{FrameResult, ScanEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Identifies one opened camera stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

/// A per-frame decoder result tagged with the stream that produced it
#[derive(Debug, Clone)]
pub struct DecoderFrame {
    pub handle: HandleId,
    pub result: FrameResult,
}

/// Push side of the frame channel, handed to the decoder service per stream
#[derive(Debug, Clone)]
pub struct FrameSink {
    handle: HandleId,
    sender: mpsc::UnboundedSender<DecoderFrame>,
}

impl FrameSink {
    pub fn new(handle: HandleId, sender: mpsc::UnboundedSender<DecoderFrame>) -> Self {
        Self { handle, sender }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Deliver a frame result; false once the session side has gone away
    pub fn push(&self, result: FrameResult) -> bool {
        self.sender
            .send(DecoderFrame {
                handle: self.handle,
                result,
            })
            .is_ok()
    }

    pub fn decoded(&self, code: &str, decoded_at: DateTime<Utc>) -> bool {
        self.push(FrameResult::Decoded(ScanEvent::new(code, decoded_at)))
    }

    pub fn miss(&self) -> bool {
        self.push(FrameResult::NoCode)
    }
}

/// Liveness of the media track behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub track_live: bool,
    pub width: u32,
    pub height: u32,
}

impl StreamStatus {
    pub fn live(width: u32, height: u32) -> Self {
        Self {
            track_live: true,
            width,
            height,
        }
    }

    pub fn ended() -> Self {
        Self {
            track_live: false,
            width: 0,
            height: 0,
        }
    }

    /// A live track with real dimensions, not just an existing handle
    pub fn is_producing(&self) -> bool {
        self.track_live && self.width > 0 && self.height > 0
    }
}

/// The opaque QR decode engine plus the camera it reads from
#[async_trait]
pub trait DecoderService: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &'static str;

    /// Open a camera stream and begin decoding frames into `sink`
    async fn start(
        &self,
        id: HandleId,
        selector: &CameraSelector,
        settings: &DecodeSettings,
        sink: FrameSink,
    ) -> Result<(), CameraError>;

    /// Stop decoding and release the stream
    async fn stop(&self, id: HandleId) -> Result<(), CameraError>;

    fn is_running(&self, id: HandleId) -> bool;

    /// Track state and dimensions, if the stream is known to the service
    fn stream_status(&self, id: HandleId) -> Option<StreamStatus>;
}

/// An acquired camera stream bound to the decoder.
///
/// Not `Clone`: exactly one owner may stop it.
#[derive(Debug)]
pub struct CameraHandle {
    id: HandleId,
    selector: CameraSelector,
    opened_at: DateTime<Utc>,
    stopped: bool,
}

impl CameraHandle {
    fn new(id: HandleId, selector: CameraSelector) -> Self {
        Self {
            id,
            selector,
            opened_at: Utc::now(),
            stopped: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn selector(&self) -> &CameraSelector {
        &self.selector
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Wraps a decoder service with the selector fallback chain and idempotent stop
pub struct DecoderAdapter {
    service: Arc<dyn DecoderService>,
    frames: mpsc::UnboundedSender<DecoderFrame>,
    next_id: AtomicU64,
}

impl DecoderAdapter {
    pub fn new(
        service: Arc<dyn DecoderService>,
        frames: mpsc::UnboundedSender<DecoderFrame>,
    ) -> Self {
        Self {
            service,
            frames,
            next_id: AtomicU64::new(1),
        }
    }

    /// Try each selector in order, returning the first stream that opens.
    ///
    /// An engine that cannot initialize ends the chain immediately; other
    /// failures fall through to the next selector.
    pub async fn start(
        &self,
        selectors: &[CameraSelector],
        settings: &DecodeSettings,
    ) -> Result<CameraHandle, CameraError> {
        let mut last_error = None;

        for selector in selectors {
            let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let sink = FrameSink::new(id, self.frames.clone());

            debug!(
                "Starting {} decoder with {} ({}fps, box {}px)",
                self.service.name(),
                selector,
                settings.fps,
                settings.box_size
            );

            match self.service.start(id, selector, settings, sink).await {
                Ok(()) => {
                    info!("Camera stream {} opened with {}", id, selector);
                    return Ok(CameraHandle::new(id, selector.clone()));
                }
                Err(e @ CameraError::EngineUnavailable { .. }) => {
                    error!("Decoder engine failed to initialize: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Camera selector {} failed: {}", selector, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CameraError::other("no camera selectors configured")))
    }

    /// Stop a handle. Stopping an already-stopped handle is a no-op.
    pub async fn stop(&self, handle: &mut CameraHandle) -> Result<(), CameraError> {
        if handle.stopped {
            trace!("Camera stream {} already stopped", handle.id);
            return Ok(());
        }
        handle.stopped = true;

        if !self.service.is_running(handle.id) {
            debug!("Camera stream {} was no longer running", handle.id);
            return Ok(());
        }

        self.service.stop(handle.id).await?;
        info!("Camera stream {} stopped", handle.id);
        Ok(())
    }

    pub fn is_running(&self, handle: &CameraHandle) -> bool {
        !handle.stopped && self.service.is_running(handle.id)
    }

    pub fn stream_status(&self, handle: &CameraHandle) -> Option<StreamStatus> {
        if handle.stopped {
            return None;
        }
        self.service.stream_status(handle.id)
    }
}
