use super::controller::SessionController;
use super::display::ExpiryTimer;
use super::state::SessionState;
use crate::config::TicketScanConfig;
use crate::decoder::{DecodeSettings, DecoderAdapter, DecoderService};
use crate::error::{Result, ScanError};
use crate::events::EventBus;
use crate::feedback::FeedbackEmitter;
use crate::history::ScanHistory;
use crate::ledger::DedupLedger;
use crate::lifecycle::{CameraLifecycleManager, CameraPermissions, SecureOrigin};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Builder for the scanning session controller
pub struct SessionControllerBuilder {
    config: Option<TicketScanConfig>,
    decoder: Option<Arc<dyn DecoderService>>,
    permissions: Option<Arc<dyn CameraPermissions>>,
    feedback: Option<FeedbackEmitter>,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            decoder: None,
            permissions: None,
            feedback: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: TicketScanConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn DecoderService>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn CameraPermissions>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Feedback emitter; defaults to a silent one
    pub fn feedback(mut self, feedback: FeedbackEmitter) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Event bus to publish on; a private one is created otherwise
    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<SessionController> {
        let config = self.config.unwrap_or_default();
        let decoder = self
            .decoder
            .ok_or_else(|| ScanError::system("Decoder service must be specified"))?;
        let permissions = self
            .permissions
            .ok_or_else(|| ScanError::system("Camera permission source must be specified"))?;

        let origin = SecureOrigin::parse(&config.lifecycle.origin).map_err(|e| {
            ScanError::system(format!(
                "Invalid scanner origin '{}': {}",
                config.lifecycle.origin, e
            ))
        })?;

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(config.system.event_bus_capacity)));
        let feedback = self
            .feedback
            .unwrap_or_else(|| FeedbackEmitter::silent(config.feedback.clone()));

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let adapter = Arc::new(DecoderAdapter::new(decoder, frames_tx));
        let lifecycle = CameraLifecycleManager::new(
            adapter,
            permissions,
            origin,
            config.decoder.selectors.clone(),
            DecodeSettings::from_config(&config.decoder),
        );

        Ok(SessionController {
            restart_delay: config.lifecycle.restart_delay(),
            auto_start: config.lifecycle.auto_start,
            session_id: Uuid::new_v4(),
            state: SessionState::Idle,
            lifecycle,
            ledger: DedupLedger::new(config.scanner.debounce_window()),
            history: ScanHistory::new(config.scanner.history_capacity),
            feedback,
            event_bus,
            displayed: None,
            display_timer: ExpiryTimer::new(),
            recovery_timer: ExpiryTimer::new(),
            attempt: 0,
            stats: Default::default(),
            internal_tx,
            internal_rx,
            frames_rx,
            snapshots: None,
            scanner: config.scanner,
        })
    }
}

impl Default for SessionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
