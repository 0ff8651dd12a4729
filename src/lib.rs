pub mod config;
pub mod console;
pub mod decoder;
pub mod error;
pub mod events;
pub mod feedback;
pub mod history;
pub mod ledger;
pub mod lifecycle;
pub mod session;

pub use config::TicketScanConfig;
pub use error::{CameraError, FailureReason, Result, ScanError};
pub use events::{
    EventBus, EventFilter, EventReceiver, FrameResult, OutcomeClass, ScanEvent, ScanOutcome,
    SessionEvent,
};
pub use decoder::{
    CameraHandle, CameraSelector, DecodeSettings, DecoderAdapter, DecoderService, HandleId,
    SimulatedDecoderService,
};
pub use feedback::{ConsoleFeedback, FeedbackClass, FeedbackEmitter};
pub use history::{HistoryEntry, ScanHistory};
pub use ledger::{DedupLedger, SessionMemory};
pub use lifecycle::{
    CameraLifecycleManager, CameraPermissions, LifecycleSignal, PermissionQuery, PermissionState,
    SecureOrigin, SimulatedPermissions,
};
pub use session::{
    SessionController, SessionControllerBuilder, SessionInput, SessionSnapshot, SessionState,
};
