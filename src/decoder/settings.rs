use crate::config::DecoderConfig;
use serde::{Deserialize, Serialize};

/// Parameters handed to the decoder service when a stream starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeSettings {
    pub fps: u32,
    /// Side of the square scan box in device-independent pixels
    pub box_size: u32,
    pub aspect_ratio: f64,
}

impl DecodeSettings {
    /// Size the scan box for a viewport: a fraction of the shorter side, clamped
    pub fn for_viewport(config: &DecoderConfig, viewport: (u32, u32)) -> Self {
        let shorter = viewport.0.min(viewport.1) as f64;
        let box_size = ((shorter * config.box_fraction).floor() as u32)
            .max(config.box_min)
            .min(config.box_max);

        Self {
            fps: config.fps,
            box_size,
            aspect_ratio: config.aspect_ratio,
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::for_viewport(config, config.viewport)
    }
}
