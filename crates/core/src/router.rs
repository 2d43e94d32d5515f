//! Artifact routing.
//!
//! Takes what an overlay produced (image bytes, an OCR crop, or a finished
//! recording) and sends it to the clipboard, history or disk. The router
//! holds no session state; it reports back whether the triggering window
//! should close. File-system failures become notifications.

use crate::clipboard::ClipboardSink;
use crate::error::{AppError, Result};
use crate::history::HistorySink;
use crate::notify::{Notifier, Severity};
use crate::ocr::TextRecognizer;
use crate::recording::{unix_millis, TempVideoFile};
use async_trait::async_trait;
use directories::UserDirs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Grace period between a clipboard write or overlay hide and the next step.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// What should happen to the overlay that produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Close,
    KeepOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub title: String,
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub filter_name: String,
    pub extensions: Vec<String>,
}

/// Native save-file prompt. `None` means the user cancelled.
#[async_trait]
pub trait SaveDialog: Send + Sync {
    async fn save_file(&self, request: SaveRequest) -> Option<PathBuf>;
}

/// Save dialogs through `rfd`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDialogs;

#[async_trait]
impl SaveDialog for NativeDialogs {
    async fn save_file(&self, request: SaveRequest) -> Option<PathBuf> {
        let mut dialog = rfd::AsyncFileDialog::new()
            .set_title(&request.title)
            .set_file_name(&request.file_name)
            .add_filter(&request.filter_name, request.extensions.as_slice());
        if let Some(dir) = &request.directory {
            dialog = dialog.set_directory(dir);
        }
        dialog
            .save_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }
}

/// How a recording ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Saved(PathBuf),
    /// The temp file was kept; its path went to the clipboard and history.
    Preserved(PathBuf),
}

#[derive(Clone)]
pub struct ArtifactRouter {
    clipboard: Arc<dyn ClipboardSink>,
    history: Arc<dyn HistorySink>,
    recognizer: Arc<dyn TextRecognizer>,
    dialogs: Arc<dyn SaveDialog>,
    notifier: Arc<dyn Notifier>,
    languages: Vec<String>,
    pictures_dir: Option<PathBuf>,
    videos_dir: Option<PathBuf>,
}

impl ArtifactRouter {
    pub fn new(
        clipboard: Arc<dyn ClipboardSink>,
        history: Arc<dyn HistorySink>,
        recognizer: Arc<dyn TextRecognizer>,
        dialogs: Arc<dyn SaveDialog>,
        notifier: Arc<dyn Notifier>,
        languages: Vec<String>,
    ) -> Self {
        let dirs = UserDirs::new();
        Self {
            clipboard,
            history,
            recognizer,
            dialogs,
            notifier,
            languages,
            pictures_dir: dirs.as_ref().and_then(|d| d.picture_dir()).map(Path::to_path_buf),
            videos_dir: dirs.as_ref().and_then(|d| d.video_dir()).map(Path::to_path_buf),
        }
    }

    /// Overrides the default folders offered by save dialogs.
    pub fn with_default_dirs(mut self, pictures: Option<PathBuf>, videos: Option<PathBuf>) -> Self {
        self.pictures_dir = pictures;
        self.videos_dir = videos;
        self
    }

    pub async fn copy_image(&self, png: &[u8]) -> WindowAction {
        match self.clipboard.write_image(png) {
            Ok(()) => {
                log::info!("Copied {} byte image to clipboard", png.len());
                self.notifier.notify("Image copied to clipboard", Severity::Success);
            }
            Err(e) => {
                log::error!("Clipboard image write failed: {}", e);
                self.notifier
                    .notify(&format!("Could not copy image: {}", e), Severity::Error);
            }
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        WindowAction::Close
    }

    /// Prompts for a destination; the window stays open if the user cancels.
    pub async fn save_image(&self, png: &[u8]) -> WindowAction {
        let request = SaveRequest {
            title: "Save screenshot".to_string(),
            directory: self.pictures_dir.clone(),
            file_name: format!("snip_{}.png", unix_millis()),
            filter_name: "PNG image".to_string(),
            extensions: vec!["png".to_string()],
        };

        let Some(path) = self.dialogs.save_file(request).await else {
            log::info!("{}", AppError::DialogCancelled);
            self.notifier.notify("Save cancelled", Severity::Info);
            return WindowAction::KeepOpen;
        };

        match tokio::fs::write(&path, png).await {
            Ok(()) => {
                log::info!("Saved screenshot to {}", path.display());
                self.notifier
                    .notify(&format!("Saved to {}", path.display()), Severity::Success);
                WindowAction::Close
            }
            Err(e) => {
                log::error!("Writing {} failed: {}", path.display(), e);
                self.notifier
                    .notify(&format!("Could not save image: {}", e), Severity::Error);
                WindowAction::KeepOpen
            }
        }
    }

    /// Runs OCR and stores non-empty text. Returns the stored text.
    pub async fn recognize(&self, png: &[u8]) -> Option<String> {
        let text = match self.recognizer.recognize(png, &self.languages).await {
            Ok(text) => text,
            Err(e) => {
                log::error!("{}", e);
                self.notifier.notify("Text recognition failed", Severity::Error);
                return None;
            }
        };

        let text = text.trim();
        if text.is_empty() {
            log::info!("OCR found no text");
            self.notifier.notify("No text found", Severity::Info);
            return None;
        }

        let copied = self.clipboard.write_text(text);
        self.history.add_entry(text);
        self.notifier.refresh_history();
        match copied {
            Ok(()) => self.notifier.notify("Text copied to clipboard", Severity::Success),
            Err(e) => {
                log::error!("Clipboard text write failed: {}", e);
                self.notifier
                    .notify("Text saved to history only (clipboard unavailable)", Severity::Warning);
            }
        }
        Some(text.to_string())
    }

    /// Waits for the chunk writer, then asks where the recording should go.
    ///
    /// The overlay must already be hidden. The temp file is removed only after
    /// a successful copy; on cancel or failure it stays and its path is surfaced.
    pub async fn finish_recording(
        &self,
        temp: TempVideoFile,
        writer: JoinHandle<Result<u64>>,
    ) -> VideoOutcome {
        self.drain_writer(writer).await;
        tokio::time::sleep(SETTLE_DELAY).await;

        let request = SaveRequest {
            title: "Save recording".to_string(),
            directory: self.videos_dir.clone(),
            file_name: format!("recording_{}.webm", unix_millis()),
            filter_name: "WebM video".to_string(),
            extensions: vec!["webm".to_string()],
        };

        let Some(dest) = self.dialogs.save_file(request).await else {
            return self.preserve(temp, "Recording kept");
        };

        if let Err(e) = tokio::fs::copy(temp.path(), &dest).await {
            log::error!(
                "Copying {} to {} failed: {}",
                temp.path().display(),
                dest.display(),
                e
            );
            self.notifier
                .notify(&format!("Could not save recording: {}", e), Severity::Error);
            return self.preserve(temp, "Recording kept");
        }

        if let Err(e) = tokio::fs::remove_file(temp.path()).await {
            log::warn!("Could not remove {}: {}", temp.path().display(), e);
        }
        log::info!("Saved recording to {}", dest.display());
        self.notifier
            .notify(&format!("Recording saved to {}", dest.display()), Severity::Success);
        VideoOutcome::Saved(dest)
    }

    /// Keeps a recording whose overlay went away before it was stopped.
    pub async fn abandon_recording(
        &self,
        temp: TempVideoFile,
        writer: JoinHandle<Result<u64>>,
    ) -> VideoOutcome {
        self.drain_writer(writer).await;
        self.preserve(temp, "Recording interrupted")
    }

    async fn drain_writer(&self, writer: JoinHandle<Result<u64>>) {
        match writer.await {
            Ok(Ok(bytes)) => log::debug!("Recording stream closed after {} bytes", bytes),
            Ok(Err(e)) => {
                log::error!("Writing recording chunks failed: {}", e);
                self.notifier
                    .notify(&format!("Recording may be incomplete: {}", e), Severity::Warning);
            }
            Err(e) => log::error!("Recording writer task failed: {}", e),
        }
    }

    fn preserve(&self, temp: TempVideoFile, reason: &str) -> VideoOutcome {
        let path = temp.path().to_path_buf();
        let shown = path.display().to_string();
        if let Err(e) = self.clipboard.write_text(&shown) {
            log::warn!("Could not put recording path on clipboard: {}", e);
        }
        self.history.add_entry(&shown);
        self.notifier.refresh_history();
        self.notifier.notify(
            &format!("{}: {} (path copied to clipboard)", reason, shown),
            Severity::Info,
        );
        VideoOutcome::Preserved(path)
    }
}
