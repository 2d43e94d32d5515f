//! Capture modes.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a capture session produces.
///
/// The mode picks the overlay surface, how the overlay's terminal message is
/// read, and where the resulting artifact goes. Every dispatch on it is an
/// exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Screenshot with annotation tools.
    Draw,
    /// Screenshot of a region handed to text recognition.
    Ocr,
    /// Screen recording of a region.
    Video,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 3] = [CaptureMode::Draw, CaptureMode::Ocr, CaptureMode::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Draw => "draw",
            CaptureMode::Ocr => "ocr",
            CaptureMode::Video => "video",
        }
    }

    /// Title of the overlay window for this mode.
    pub fn window_title(&self) -> &'static str {
        match self {
            CaptureMode::Draw => "clipcap snip",
            CaptureMode::Ocr => "clipcap text capture",
            CaptureMode::Video => "clipcap recorder",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draw" => Ok(CaptureMode::Draw),
            "ocr" => Ok(CaptureMode::Ocr),
            "video" => Ok(CaptureMode::Video),
            other => Err(AppError::config(format!("unknown capture mode '{}'", other))),
        }
    }
}
