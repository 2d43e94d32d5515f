//! Environment configuration.
//!
//! Values that depend on the machine rather than on the user's preferences:
//! external tool locations, OCR languages, the scratch directory for
//! recordings. Read from the environment (and a `.env` file if present).

use crate::error::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Languages passed to the OCR backend when none are configured.
pub const DEFAULT_OCR_LANGUAGES: &[&str] = &["eng", "tur"];

#[derive(Clone, Debug)]
pub struct Config {
    pub ocr_languages: Vec<String>,
    pub tesseract_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub temp_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let mut builder = Config::builder();
        if let Ok(langs) = env::var("CLIPCAP_OCR_LANGS") {
            builder = builder.with_ocr_languages(&langs);
        }
        if let Ok(path) = env::var("CLIPCAP_TESSERACT") {
            builder = builder.with_tesseract(path);
        }
        if let Ok(path) = env::var("CLIPCAP_FFMPEG") {
            builder = builder.with_ffmpeg(path);
        }
        if let Ok(dir) = env::var("CLIPCAP_TEMP_DIR") {
            builder = builder.with_temp_dir(dir);
        }
        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocr_languages: DEFAULT_OCR_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            tesseract_path: PathBuf::from("tesseract"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            temp_dir: env::temp_dir(),
        }
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    ocr_languages: Option<String>,
    tesseract_path: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Languages in tesseract's `eng+tur` notation.
    pub fn with_ocr_languages(mut self, langs: &str) -> Self {
        self.ocr_languages = Some(langs.to_string());
        self
    }

    pub fn with_tesseract(mut self, path: impl Into<PathBuf>) -> Self {
        self.tesseract_path = Some(path.into());
        self
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();

        let ocr_languages = match self.ocr_languages {
            Some(raw) => {
                let langs: Vec<String> = raw
                    .split('+')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                if langs.is_empty() {
                    return Err(AppError::config("OCR language list is empty"));
                }
                langs
            }
            None => defaults.ocr_languages,
        };

        Ok(Config {
            ocr_languages,
            tesseract_path: self.tesseract_path.unwrap_or(defaults.tesseract_path),
            ffmpeg_path: self.ffmpeg_path.unwrap_or(defaults.ffmpeg_path),
            temp_dir: self.temp_dir.unwrap_or(defaults.temp_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_splits_language_list() {
        let config = Config::builder().with_ocr_languages("eng + deu").build().unwrap();
        assert_eq!(config.ocr_languages, vec!["eng", "deu"]);
    }

    #[test]
    fn empty_language_list_is_rejected() {
        assert!(Config::builder().with_ocr_languages(" + ").build().is_err());
    }

    #[test]
    fn defaults_use_tools_from_path() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config.tesseract_path, PathBuf::from("tesseract"));
        assert_eq!(config.ocr_languages, vec!["eng", "tur"]);
    }
}
