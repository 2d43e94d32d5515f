//! Text recognition backend.

use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognizes text in a PNG image. Languages use tesseract codes (`eng`, `tur`).
    async fn recognize(&self, png: &[u8], languages: &[String]) -> Result<String>;
}

/// Runs the `tesseract` binary, feeding the image on stdin.
pub struct TesseractCli {
    program: PathBuf,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tesseract_path.clone())
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(&self, png: &[u8], languages: &[String]) -> Result<String> {
        let langs = languages.join("+");
        log::debug!("Running {} -l {}", self.program.display(), langs);

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "-l", &langs])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::recognition(format!("failed to start {}: {}", self.program.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(png).await?;
            // closing stdin lets tesseract start
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
