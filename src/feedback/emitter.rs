use super::cue::{FeedbackClass, FeedbackCue, Tone};
use crate::config::FeedbackConfig;
use crate::error::FeedbackError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tone generator behind the feedback emitter
pub trait ToneOutput: Send + Sync {
    /// Create the audio context. Only called once a user interaction exists.
    fn initialize(&self) -> Result<(), FeedbackError>;

    fn play(&self, tones: &[Tone], volume: f32) -> Result<(), FeedbackError>;
}

/// Vibration motor behind the feedback emitter
pub trait HapticOutput: Send + Sync {
    fn vibrate(&self, pattern_ms: &[u64]) -> Result<(), FeedbackError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioState {
    Uninitialized,
    Ready,
    Unavailable,
}

/// What a single emit call actually produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub tone_played: bool,
    pub vibrated: bool,
}

/// Best-effort audio/haptic cues for scan outcomes.
///
/// Nothing is emitted until [`FeedbackEmitter::note_user_interaction`] has
/// been called; audio is then initialized lazily on the first cue. Backend
/// failures are logged and never surface to the caller.
pub struct FeedbackEmitter {
    config: FeedbackConfig,
    tones: Option<Arc<dyn ToneOutput>>,
    haptics: Option<Arc<dyn HapticOutput>>,
    user_interacted: bool,
    audio: AudioState,
}

impl FeedbackEmitter {
    pub fn new(
        config: FeedbackConfig,
        tones: Option<Arc<dyn ToneOutput>>,
        haptics: Option<Arc<dyn HapticOutput>>,
    ) -> Self {
        Self {
            config,
            tones,
            haptics,
            user_interacted: false,
            audio: AudioState::Uninitialized,
        }
    }

    /// Emitter with no backends at all
    pub fn silent(config: FeedbackConfig) -> Self {
        Self::new(config, None, None)
    }

    pub fn note_user_interaction(&mut self) {
        if !self.user_interacted {
            debug!("User interaction recorded, feedback armed");
        }
        self.user_interacted = true;
    }

    pub fn is_armed(&self) -> bool {
        self.user_interacted
    }

    pub fn emit(&mut self, class: FeedbackClass) -> EmitReport {
        if !self.user_interacted {
            debug!("Feedback {:?} skipped, no user interaction yet", class);
            return EmitReport::default();
        }

        let cue = FeedbackCue::for_class(class);
        EmitReport {
            tone_played: self.play_tones(&cue),
            vibrated: self.vibrate(&cue),
        }
    }

    fn ensure_audio(&mut self) -> bool {
        if self.audio == AudioState::Uninitialized {
            self.audio = match self.tones.as_ref().map(|t| t.initialize()) {
                Some(Ok(())) => {
                    info!("Audio feedback initialized");
                    AudioState::Ready
                }
                Some(Err(e)) => {
                    warn!("Audio feedback unavailable: {}", e);
                    AudioState::Unavailable
                }
                None => AudioState::Unavailable,
            };
        }
        self.audio == AudioState::Ready
    }

    fn play_tones(&mut self, cue: &FeedbackCue) -> bool {
        if !self.config.audio || !self.ensure_audio() {
            return false;
        }

        match self.tones.as_ref() {
            Some(tones) => match tones.play(&cue.tones, self.config.volume) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Tone playback failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    fn vibrate(&self, cue: &FeedbackCue) -> bool {
        if !self.config.haptics {
            return false;
        }

        match self.haptics.as_ref() {
            Some(haptics) => match haptics.vibrate(&cue.vibration_ms) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Vibration failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }
}
