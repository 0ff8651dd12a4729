mod adapter;
mod selector;
mod settings;
pub mod simulated;

pub use adapter::{
    CameraHandle, DecoderAdapter, DecoderFrame, DecoderService, FrameSink, HandleId, StreamStatus,
};
pub use selector::{CameraSelector, FacingMode};
pub use settings::DecodeSettings;
pub use simulated::SimulatedDecoderService;
