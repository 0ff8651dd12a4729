mod console;
mod cue;
mod emitter;

pub use console::ConsoleFeedback;
pub use cue::{FeedbackClass, FeedbackCue, Tone};
pub use emitter::{EmitReport, FeedbackEmitter, HapticOutput, ToneOutput};
