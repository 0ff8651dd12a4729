use crate::decoder::CameraSelector;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TicketScanConfig {
    pub scanner: ScannerConfig,
    pub decoder: DecoderConfig,
    pub feedback: FeedbackConfig,
    pub lifecycle: LifecycleConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    /// Same code re-read within this window is treated as noise
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,

    /// How long a classified result stays on screen
    #[serde(default = "default_display_window_ms")]
    pub display_window_ms: u64,

    /// Number of recent outcomes kept in the scan history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecoderConfig {
    /// Frames per second handed to the decoder
    #[serde(default = "default_decoder_fps")]
    pub fps: u32,

    /// Aspect ratio requested from the camera
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,

    /// Scan box size as a fraction of the shorter viewport side
    #[serde(default = "default_box_fraction")]
    pub box_fraction: f64,

    /// Lower clamp for the scan box, in device-independent pixels
    #[serde(default = "default_box_min")]
    pub box_min: u32,

    /// Upper clamp for the scan box, in device-independent pixels
    #[serde(default = "default_box_max")]
    pub box_max: u32,

    /// Viewport (width, height) used to size the scan box
    #[serde(default = "default_viewport")]
    pub viewport: (u32, u32),

    /// Camera selectors tried in order until one opens
    #[serde(default = "default_selectors")]
    pub selectors: Vec<CameraSelector>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedbackConfig {
    /// Play tones on scan outcomes
    #[serde(default = "default_feedback_audio")]
    pub audio: bool,

    /// Request vibration patterns on scan outcomes
    #[serde(default = "default_feedback_haptics")]
    pub haptics: bool,

    /// Tone gain (0.0 - 1.0)
    #[serde(default = "default_feedback_volume")]
    pub volume: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Origin the scanner is served from; decides secure-context checks
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Delay before restarting the camera after the page comes back
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Probe camera access as soon as the session is mounted
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Session event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Operator input queue capacity
    #[serde(default = "default_input_queue_capacity")]
    pub input_queue_capacity: usize,
}

impl ScannerConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn display_window(&self) -> Duration {
        Duration::from_millis(self.display_window_ms)
    }
}

impl LifecycleConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl TicketScanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("ticketscan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let selectors: Vec<String> = default_selectors().iter().map(|s| s.to_string()).collect();

        let settings = Config::builder()
            .set_default("scanner.debounce_window_ms", default_debounce_window_ms())?
            .set_default("scanner.display_window_ms", default_display_window_ms())?
            .set_default(
                "scanner.history_capacity",
                default_history_capacity() as i64,
            )?
            .set_default("decoder.fps", default_decoder_fps())?
            .set_default("decoder.aspect_ratio", default_aspect_ratio())?
            .set_default("decoder.box_fraction", default_box_fraction())?
            .set_default("decoder.box_min", default_box_min())?
            .set_default("decoder.box_max", default_box_max())?
            .set_default(
                "decoder.viewport",
                vec![default_viewport().0, default_viewport().1],
            )?
            .set_default("decoder.selectors", selectors)?
            .set_default("feedback.audio", default_feedback_audio())?
            .set_default("feedback.haptics", default_feedback_haptics())?
            .set_default("feedback.volume", default_feedback_volume() as f64)?
            .set_default("lifecycle.origin", default_origin())?
            .set_default("lifecycle.restart_delay_ms", default_restart_delay_ms())?
            .set_default("lifecycle.auto_start", default_auto_start())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.input_queue_capacity",
                default_input_queue_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // TICKETSCAN__SCANNER__DEBOUNCE_WINDOW_MS=1500
            .add_source(Environment::with_prefix("TICKETSCAN").separator("__"))
            .build()?;

        let config: TicketScanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.debounce_window_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner debounce_window_ms must be greater than 0".to_string(),
            ));
        }

        if self.scanner.display_window_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner display_window_ms must be greater than 0".to_string(),
            ));
        }

        if self.scanner.history_capacity == 0 {
            return Err(ConfigError::Message(
                "Scanner history_capacity must be greater than 0".to_string(),
            ));
        }

        if self.decoder.fps == 0 {
            return Err(ConfigError::Message(
                "Decoder fps must be greater than 0".to_string(),
            ));
        }

        if !(self.decoder.box_fraction > 0.0 && self.decoder.box_fraction <= 1.0) {
            return Err(ConfigError::Message(
                "Decoder box_fraction must be in (0, 1]".to_string(),
            ));
        }

        if self.decoder.box_min > self.decoder.box_max {
            return Err(ConfigError::Message(
                "Decoder box_min must not exceed box_max".to_string(),
            ));
        }

        if self.decoder.aspect_ratio <= 0.0 {
            return Err(ConfigError::Message(
                "Decoder aspect_ratio must be greater than 0".to_string(),
            ));
        }

        if self.decoder.selectors.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera selector is required".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.feedback.volume) {
            return Err(ConfigError::Message(
                "Feedback volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        Url::parse(&self.lifecycle.origin).map_err(|e| {
            ConfigError::Message(format!(
                "Lifecycle origin '{}' is not a valid URL: {}",
                self.lifecycle.origin, e
            ))
        })?;

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.input_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Input queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for TicketScanConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig {
                debounce_window_ms: default_debounce_window_ms(),
                display_window_ms: default_display_window_ms(),
                history_capacity: default_history_capacity(),
            },
            decoder: DecoderConfig {
                fps: default_decoder_fps(),
                aspect_ratio: default_aspect_ratio(),
                box_fraction: default_box_fraction(),
                box_min: default_box_min(),
                box_max: default_box_max(),
                viewport: default_viewport(),
                selectors: default_selectors(),
            },
            feedback: FeedbackConfig {
                audio: default_feedback_audio(),
                haptics: default_feedback_haptics(),
                volume: default_feedback_volume(),
            },
            lifecycle: LifecycleConfig {
                origin: default_origin(),
                restart_delay_ms: default_restart_delay_ms(),
                auto_start: default_auto_start(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                input_queue_capacity: default_input_queue_capacity(),
            },
        }
    }
}

// Default value functions
fn default_debounce_window_ms() -> u64 {
    2000
}
fn default_display_window_ms() -> u64 {
    2000
}
fn default_history_capacity() -> usize {
    10
}

fn default_decoder_fps() -> u32 {
    10
}
fn default_aspect_ratio() -> f64 {
    1.0
}
fn default_box_fraction() -> f64 {
    0.8
}
fn default_box_min() -> u32 {
    200
}
fn default_box_max() -> u32 {
    300
}
fn default_viewport() -> (u32, u32) {
    (1280, 720)
}
fn default_selectors() -> Vec<CameraSelector> {
    CameraSelector::default_chain()
}

fn default_feedback_audio() -> bool {
    true
}
fn default_feedback_haptics() -> bool {
    true
}
fn default_feedback_volume() -> f32 {
    0.3
}

fn default_origin() -> String {
    "https://localhost".to_string()
}
fn default_restart_delay_ms() -> u64 {
    300
}
fn default_auto_start() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_input_queue_capacity() -> usize {
    64
}
