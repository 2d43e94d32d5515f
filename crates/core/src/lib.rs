//! clipcap core library
//!
//! Clipboard history plus three screen-capture modes: annotate a screenshot
//! (`draw`), recognise text in a region (`ocr`) and record a region to WebM
//! (`video`).
//!
//! # Overview
//!
//! A capture is one session of the [`session`] state machine:
//!
//! - **Display resolution**: the display under the pointer and a frame of it, via [`capture`]
//! - **Overlay**: a transparent window over that display, via [`ui`]
//! - **Routing**: the overlay's output goes to clipboard, history or disk, via [`router`]
//!
//! Around it sit the [`history`] store, persisted [`settings`], the [`ocr`]
//! and [`recording`] backends, and [`clipboard`] access.
//!
//! # Quick Start
//!
//! ```ignore
//! use clipcap_core::{Clipcap, CaptureMode};
//! use clipcap_core::session::CaptureSession;
//! use clipcap_core::ui::overlay_pump;
//!
//! let app = Clipcap::new()?;
//! let pointer = clipcap_core::capture::PointerTracker::new();
//! let (host, pump) = overlay_pump(pointer.clone());
//! // on a runtime thread:
//! let session = CaptureSession::spawn(app.services(Arc::new(host), pointer)?);
//! session.start_capture(CaptureMode::Draw).await;
//! // on the main thread:
//! pump.run();
//! ```
//!
//! # Module Structure
//!
//! - [`capture`]: displays, frames and the pointer tracker
//! - [`clipboard`]: clipboard writes and the history watcher
//! - [`config`]: environment configuration
//! - [`error`]: error types and result aliases
//! - [`geometry`]: logical rectangles and selections
//! - [`history`]: clipboard history and its JSON store
//! - [`hotkey`]: shortcut parsing
//! - [`image_processing`]: cropping and PNG encoding
//! - [`mode`]: the three capture modes
//! - [`notify`]: user notifications
//! - [`ocr`]: text recognition
//! - [`permissions`]: screen-capture permission checks
//! - [`recording`]: the screen recorder and chunk writer
//! - [`router`]: artifact routing
//! - [`session`]: the capture session state machine
//! - [`settings`]: persisted user settings
//! - [`ui`]: overlay windows

pub mod capture;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod hotkey;
pub mod image_processing;
pub mod mode;
pub mod notify;
pub mod ocr;
pub mod permissions;
pub mod recording;
pub mod router;
pub mod session;
pub mod settings;
pub mod ui;

pub use capture::{DisplayInfo, PointerTracker, ScreenCapturer};
pub use config::Config;
pub use error::{AppError, Result};
pub use mode::CaptureMode;
pub use session::{CaptureSession, SessionHandle, StartOutcome};
pub use settings::Settings;

use clipboard::{ClipboardWatcher, LastText, SystemClipboard};
use history::{History, HistoryStore, SharedHistory};
use notify::LogNotifier;
use ocr::TesseractCli;
use permissions::SystemPermissions;
use router::{ArtifactRouter, NativeDialogs};
use session::{SessionConfig, Services};
use std::sync::Arc;
use ui::OverlayHost;

/// Main entry point for the clipcap application.
///
/// Loads configuration and settings, opens the history, and wires the
/// production collaborators into session [`Services`].
pub struct Clipcap {
    config: Config,
    settings: Settings,
    history: SharedHistory,
    last_text: LastText,
}

impl Clipcap {
    /// Loads `.env`/environment configuration and the persisted settings.
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(Config::load()?))
    }

    pub fn with_config(config: Config) -> Self {
        let settings = Settings::load();
        let history = match HistoryStore::default_location() {
            Some(store) => SharedHistory::open(store, settings.max_history_items),
            None => {
                log::warn!("No data directory; history will not be saved");
                SharedHistory::new(History::new(settings.max_history_items), None)
            }
        };
        Self {
            config,
            settings,
            history,
            last_text: LastText::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    /// Lists the displays the capturer can see.
    pub fn list_monitors(&self) -> Result<Vec<DisplayInfo>> {
        ScreenCapturer::new()?.list_screens()
    }

    /// Production collaborators for a [`CaptureSession`] using `overlays`.
    pub fn services(&self, overlays: Arc<dyn OverlayHost>, pointer: PointerTracker) -> Result<Services> {
        let history = Arc::new(self.history.clone());
        let router = ArtifactRouter::new(
            Arc::new(SystemClipboard::new(self.last_text.clone())),
            history,
            Arc::new(TesseractCli::from_config(&self.config)),
            Arc::new(NativeDialogs),
            Arc::new(LogNotifier),
            self.config.ocr_languages.clone(),
        );
        Ok(Services {
            displays: Arc::new(ScreenCapturer::new()?),
            permissions: Arc::new(SystemPermissions::new()),
            overlays,
            router,
            notifier: Arc::new(LogNotifier),
            pointer,
            config: SessionConfig::from_config(&self.config),
        })
    }

    /// Copies history entry `id` to the system clipboard.
    ///
    /// Goes through the same [`LastText`] as the watcher, so the copy is not
    /// recorded as a new entry.
    pub fn copy_entry(&self, id: &str) -> Result<String> {
        self.history.copy_to(id, &SystemClipboard::new(self.last_text.clone()))
    }

    /// Starts polling the clipboard into history.
    pub fn watch_clipboard(&self) -> ClipboardWatcher {
        ClipboardWatcher::spawn(Arc::new(self.history.clone()), self.last_text.clone())
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup, before [`Config::load`].
pub fn init() {
    let _ = dotenvy::dotenv();
}
