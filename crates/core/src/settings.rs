//! User settings persistence.
//!
//! Settings are stored as JSON in the user's config directory
//! (e.g., `~/.config/clipcap/settings.json` on Linux). The capture core only
//! reads them; the CLI's `settings` commands write them.

use crate::error::{AppError, Result};
use crate::mode::CaptureMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 50;

/// Recording quality, governing the frame rate and encoder bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl VideoQuality {
    pub fn fps(&self) -> u32 {
        match self {
            VideoQuality::Low | VideoQuality::Medium => 30,
            VideoQuality::High => 60,
            VideoQuality::Ultra => 120,
        }
    }

    /// Target bitrate in bits per second.
    pub fn bitrate(&self) -> u64 {
        match self {
            VideoQuality::Low => 4_000_000,
            VideoQuality::Medium => 12_000_000,
            VideoQuality::High => 80_000_000,
            VideoQuality::Ultra => 120_000_000,
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VideoQuality::Low => "low",
            VideoQuality::Medium => "medium",
            VideoQuality::High => "high",
            VideoQuality::Ultra => "ultra",
        };
        f.write_str(s)
    }
}

impl FromStr for VideoQuality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(VideoQuality::Low),
            "medium" => Ok(VideoQuality::Medium),
            "high" => Ok(VideoQuality::High),
            "ultra" => Ok(VideoQuality::Ultra),
            other => Err(AppError::config(format!("unknown video quality '{}'", other))),
        }
    }
}

/// Global hotkey per capture mode, e.g. `Alt+9`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcuts {
    pub draw: String,
    pub ocr: String,
    pub video: String,
}

impl Shortcuts {
    pub fn for_mode(&self, mode: CaptureMode) -> &str {
        match mode {
            CaptureMode::Draw => &self.draw,
            CaptureMode::Ocr => &self.ocr,
            CaptureMode::Video => &self.video,
        }
    }

    /// Replaces the hotkey of one mode. Only non-empty ASCII combos are accepted.
    pub fn set(&mut self, mode: CaptureMode, combo: &str) -> Result<()> {
        let combo = combo.trim();
        if combo.is_empty() || !combo.is_ascii() {
            return Err(AppError::config(format!(
                "invalid shortcut '{}': use ASCII characters only",
                combo
            )));
        }
        let slot = match mode {
            CaptureMode::Draw => &mut self.draw,
            CaptureMode::Ocr => &mut self.ocr,
            CaptureMode::Video => &mut self.video,
        };
        *slot = combo.to_string();
        Ok(())
    }
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            draw: "Alt+9".to_string(),
            ocr: "Alt+2".to_string(),
            video: "Alt+8".to_string(),
        }
    }
}

/// User-configurable settings persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Upper bound on non-favorite history entries.
    #[serde(default = "default_max_items")]
    pub max_history_items: usize,
    #[serde(default)]
    pub video_quality: VideoQuality,
    #[serde(default)]
    pub shortcuts: Shortcuts,
}

fn default_max_items() -> usize {
    DEFAULT_MAX_HISTORY_ITEMS
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "clipcap", "clipcap").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    /// Loads settings from disk, falling back to defaults if not found.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads from an explicit file; a missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("Ignoring corrupt settings file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Persists settings to disk.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Err(AppError::config("no config directory available")),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn set_max_history_items(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(AppError::config("history size must be at least 1"));
        }
        self.max_history_items = count;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            video_quality: VideoQuality::default(),
            shortcuts: Shortcuts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_table() {
        assert_eq!(VideoQuality::Low.fps(), 30);
        assert_eq!(VideoQuality::Ultra.fps(), 120);
        assert_eq!(VideoQuality::Medium.bitrate(), 12_000_000);
        assert_eq!(VideoQuality::High.bitrate(), 80_000_000);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.video_quality = VideoQuality::Ultra;
        settings.shortcuts.set(CaptureMode::Ocr, "Ctrl+Shift+O").unwrap();
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "video_quality": "low" }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.video_quality, VideoQuality::Low);
        assert_eq!(settings.max_history_items, DEFAULT_MAX_HISTORY_ITEMS);
        assert_eq!(settings.shortcuts.draw, "Alt+9");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn non_ascii_shortcut_is_rejected() {
        let mut shortcuts = Shortcuts::default();
        assert!(shortcuts.set(CaptureMode::Draw, "Alt+ş").is_err());
        assert!(shortcuts.set(CaptureMode::Draw, "  ").is_err());
        assert_eq!(shortcuts.draw, "Alt+9");
    }
}
