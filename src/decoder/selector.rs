use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way the requested camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

/// One way of asking the platform for a camera stream.
///
/// Written in configuration as `facing:environment`, `facing:user` or
/// `device:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CameraSelector {
    /// Constraint object asking for a facing mode
    Facing(FacingMode),
    /// Bare device identifier string
    Device(String),
}

impl CameraSelector {
    pub fn environment() -> Self {
        Self::Facing(FacingMode::Environment)
    }

    pub fn user() -> Self {
        Self::Facing(FacingMode::User)
    }

    pub fn device<S: Into<String>>(id: S) -> Self {
        Self::Device(id.into())
    }

    /// Rear camera, then the generic identifier, then the front camera
    pub fn default_chain() -> Vec<Self> {
        vec![Self::environment(), Self::device("environment"), Self::user()]
    }
}

impl fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSelector::Facing(FacingMode::Environment) => write!(f, "facing:environment"),
            CameraSelector::Facing(FacingMode::User) => write!(f, "facing:user"),
            CameraSelector::Device(id) => write!(f, "device:{}", id),
        }
    }
}

impl FromStr for CameraSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("camera selector '{}' must look like kind:value", s))?;

        match (kind.trim(), value.trim()) {
            ("facing", "environment") => Ok(Self::environment()),
            ("facing", "user") => Ok(Self::user()),
            ("facing", other) => Err(format!("unknown facing mode '{}'", other)),
            ("device", "") => Err("device selector needs an identifier".to_string()),
            ("device", id) => Ok(Self::device(id)),
            (other, _) => Err(format!("unknown camera selector kind '{}'", other)),
        }
    }
}

impl TryFrom<String> for CameraSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CameraSelector> for String {
    fn from(selector: CameraSelector) -> Self {
        selector.to_string()
    }
}
