use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment lifecycle signals; each only means "re-evaluate"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// Page became hidden
    Hidden,
    /// Page became visible
    Visible,
    /// Window lost focus
    Blur,
    /// Window regained focus
    Focus,
    /// Page was restored from the back/forward cache
    Restored,
}

impl LifecycleSignal {
    /// Signals after which the camera may have been suspended by the platform
    pub fn is_backgrounding(&self) -> bool {
        matches!(self, LifecycleSignal::Hidden | LifecycleSignal::Blur)
    }
}

impl FromStr for LifecycleSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hidden" | "hide" => Ok(Self::Hidden),
            "visible" | "show" => Ok(Self::Visible),
            "blur" => Ok(Self::Blur),
            "focus" => Ok(Self::Focus),
            "restored" | "pageshow" => Ok(Self::Restored),
            other => Err(format!("unknown lifecycle signal '{}'", other)),
        }
    }
}
