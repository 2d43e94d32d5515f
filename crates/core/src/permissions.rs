//! Screen-capture consent.
//!
//! macOS gates screen capture behind the Screen Recording privacy setting.
//! Other platforms have no such gate and always report [`PermissionStatus::Granted`].

use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// What the user picked in the explanatory permission dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    OpenSettings,
    Dismiss,
}

#[async_trait]
pub trait PermissionProbe: Send + Sync {
    async fn status(&self) -> PermissionStatus;

    /// Explains why capture is blocked and offers to open the system settings.
    async fn prompt(&self) -> PromptChoice;

    fn open_settings(&self) -> Result<()>;
}

#[cfg(target_os = "macos")]
#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
}

const OPEN_SETTINGS_LABEL: &str = "Open Settings";

/// The OS permission state, prompted through a native message dialog.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermissions;

impl SystemPermissions {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PermissionProbe for SystemPermissions {
    async fn status(&self) -> PermissionStatus {
        #[cfg(target_os = "macos")]
        {
            // SAFETY: takes no arguments and only reads the TCC state.
            let granted = unsafe { CGPreflightScreenCaptureAccess() };
            if granted {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            }
        }
        #[cfg(not(target_os = "macos"))]
        {
            PermissionStatus::Granted
        }
    }

    async fn prompt(&self) -> PromptChoice {
        let result = rfd::AsyncMessageDialog::new()
            .set_level(rfd::MessageLevel::Warning)
            .set_title("Screen recording permission required")
            .set_description(
                "clipcap needs Screen Recording permission to capture your screen.\n\n\
                 Grant it in System Settings, then try the capture again.",
            )
            .set_buttons(rfd::MessageButtons::OkCancelCustom(
                OPEN_SETTINGS_LABEL.to_string(),
                "Later".to_string(),
            ))
            .show()
            .await;

        match result {
            rfd::MessageDialogResult::Custom(label) if label == OPEN_SETTINGS_LABEL => {
                PromptChoice::OpenSettings
            }
            rfd::MessageDialogResult::Ok | rfd::MessageDialogResult::Yes => PromptChoice::OpenSettings,
            _ => PromptChoice::Dismiss,
        }
    }

    fn open_settings(&self) -> Result<()> {
        #[cfg(target_os = "macos")]
        {
            std::process::Command::new("open")
                .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture")
                .spawn()?;
        }
        Ok(())
    }
}
