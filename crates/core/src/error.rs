//! Error types for the clipcap-core library.
//!
//! Every failure a capture session can meet has its own variant, so each
//! component boundary can decide whether to retry, keep a window open, or
//! just tell the user.

use thiserror::Error;

/// Errors that can occur within the clipcap-core library.
#[derive(Error, Debug)]
pub enum AppError {
    /// The OS has not granted screen-capture permission.
    #[error("Screen capture permission has not been granted")]
    PermissionDenied,

    /// No capturable display source was returned for the target display.
    #[error("No capturable display source is available")]
    SourceUnavailable,

    /// A capture was requested while another session is still active.
    #[error("A capture session is already in progress")]
    SessionBusy,

    /// The drawn region is below the minimum selection size.
    #[error("Selection {width}x{height} is below the minimum size")]
    InvalidSelection { width: f32, height: f32 },

    /// The OCR backend failed.
    #[error("Text recognition failed: {0}")]
    Recognition(String),

    /// No history entry has the given id.
    #[error("No history entry '{0}'")]
    UnknownEntry(String),

    /// The user dismissed a save dialog.
    #[error("Save dialog was cancelled")]
    DialogCancelled,

    /// Configuration-related errors (invalid values, unreadable files).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Screen capture operation failed.
    #[error("Screen capture failed: {0}")]
    ScreenCapture(String),

    /// Requested display id was not found.
    #[error("Screen not found: id {0}")]
    ScreenNotFound(u32),

    /// Image processing or encoding failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// Reading or writing the OS clipboard failed.
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// The screen recorder or its encoder failed.
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// UI-related errors (window creation, event loop).
    #[error("UI error: {0}")]
    Ui(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding/encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// An unclassified error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a screen capture error with the given message.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::ScreenCapture(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates a clipboard error with the given message.
    pub fn clipboard(msg: impl Into<String>) -> Self {
        Self::Clipboard(msg.into())
    }

    /// Creates a recorder error with the given message.
    pub fn recorder(msg: impl Into<String>) -> Self {
        Self::Recorder(msg.into())
    }

    /// Creates a text recognition error with the given message.
    pub fn recognition(msg: impl Into<String>) -> Self {
        Self::Recognition(msg.into())
    }

    /// Creates a UI error with the given message.
    pub fn ui(msg: impl Into<String>) -> Self {
        Self::Ui(msg.into())
    }

    /// Whether the user can recover by retrying (possibly after changing something).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::SourceUnavailable
                | Self::SessionBusy
                | Self::InvalidSelection { .. }
                | Self::DialogCancelled
                | Self::UnknownEntry(_)
                | Self::Recognition(_)
                | Self::Clipboard(_)
                | Self::Io(_)
        )
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_recoverable_conditions() {
        assert!(AppError::PermissionDenied.is_recoverable());
        assert!(AppError::SessionBusy.is_recoverable());
        assert!(AppError::Io(std::io::Error::other("disk full")).is_recoverable());
        assert!(AppError::UnknownEntry("3f2a".into()).is_recoverable());
        assert!(!AppError::ui("event loop gone").is_recoverable());
    }

    #[test]
    fn invalid_selection_message_names_size() {
        let err = AppError::InvalidSelection { width: 4.0, height: 30.0 };
        assert_eq!(err.to_string(), "Selection 4x30 is below the minimum size");
    }
}
