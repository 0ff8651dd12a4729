use super::cue::Tone;
use super::emitter::{HapticOutput, ToneOutput};
use crate::error::FeedbackError;
use std::io::Write;
use tracing::info;

/// Terminal feedback: rings the bell for tones, has no vibration motor
pub struct ConsoleFeedback {
    bell: bool,
}

impl ConsoleFeedback {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl ToneOutput for ConsoleFeedback {
    fn initialize(&self) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn play(&self, tones: &[Tone], volume: f32) -> Result<(), FeedbackError> {
        let notes: Vec<String> = tones
            .iter()
            .map(|t| format!("{:.0}Hz/{}ms", t.frequency_hz, t.duration_ms))
            .collect();
        info!("Tone {} at volume {:.2}", notes.join(" "), volume);

        if self.bell {
            let mut stderr = std::io::stderr();
            stderr
                .write_all(b"\x07")
                .and_then(|_| stderr.flush())
                .map_err(|e| FeedbackError::AudioUnavailable {
                    details: e.to_string(),
                })?;
        }

        Ok(())
    }
}

impl HapticOutput for ConsoleFeedback {
    fn vibrate(&self, _pattern_ms: &[u64]) -> Result<(), FeedbackError> {
        Err(FeedbackError::VibrationUnsupported)
    }
}
