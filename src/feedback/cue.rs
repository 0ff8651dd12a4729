use crate::events::OutcomeClass;
use serde::{Deserialize, Serialize};

/// Feedback classes the operator can tell apart by ear and touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackClass {
    Accepted,
    Rejected,
}

impl From<OutcomeClass> for FeedbackClass {
    fn from(class: OutcomeClass) -> Self {
        match class {
            OutcomeClass::Accepted => FeedbackClass::Accepted,
            OutcomeClass::Duplicate => FeedbackClass::Rejected,
        }
    }
}

/// A single sine tone scheduled relative to the start of the cue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f32,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

/// Audio and vibration pattern for one feedback class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCue {
    pub tones: Vec<Tone>,
    /// Alternating vibrate/pause durations in milliseconds
    pub vibration_ms: Vec<u64>,
}

impl FeedbackCue {
    pub fn for_class(class: FeedbackClass) -> Self {
        match class {
            // Short rising two-note chirp, short-short buzz
            FeedbackClass::Accepted => Self {
                tones: vec![
                    Tone {
                        frequency_hz: 880.0,
                        offset_ms: 0,
                        duration_ms: 90,
                    },
                    Tone {
                        frequency_hz: 1320.0,
                        offset_ms: 100,
                        duration_ms: 90,
                    },
                ],
                vibration_ms: vec![60, 40, 60],
            },
            // Single low tone, long-long buzz
            FeedbackClass::Rejected => Self {
                tones: vec![Tone {
                    frequency_hz: 220.0,
                    offset_ms: 0,
                    duration_ms: 350,
                }],
                vibration_ms: vec![250, 100, 250],
            },
        }
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.tones
            .iter()
            .map(|t| t.offset_ms + t.duration_ms)
            .max()
            .unwrap_or(0)
    }
}
