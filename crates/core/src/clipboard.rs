//! OS clipboard access and the clipboard history watcher.

use crate::error::{AppError, Result};
use crate::history::HistorySink;
use crate::image_processing::ImageProcessor;
use arboard::{Clipboard, ImageData};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where finished artifacts land on the clipboard.
pub trait ClipboardSink: Send + Sync {
    /// Writes PNG bytes into the image slot.
    fn write_image(&self, png: &[u8]) -> Result<()>;

    fn write_text(&self, text: &str) -> Result<()>;
}

/// Text most recently seen on (or written to) the clipboard.
///
/// Shared between [`SystemClipboard`] and [`ClipboardWatcher`] so our own
/// writes are not recorded a second time by the watcher.
#[derive(Clone, Default)]
pub struct LastText(Arc<Mutex<Option<String>>>);

impl LastText {
    /// Stores `text`, returning whether it differs from the previous value.
    pub fn replace(&self, text: &str) -> bool {
        match self.0.lock() {
            Ok(mut last) => {
                if last.as_deref() == Some(text) {
                    false
                } else {
                    *last = Some(text.to_string());
                    true
                }
            }
            Err(_) => true,
        }
    }
}

/// The OS clipboard via `arboard`.
///
/// The handle is kept alive for the process lifetime; on X11 the contents
/// vanish once the owning handle is dropped.
pub struct SystemClipboard {
    inner: Mutex<Option<Clipboard>>,
    last_text: LastText,
}

impl SystemClipboard {
    pub fn new(last_text: LastText) -> Self {
        Self {
            inner: Mutex::new(None),
            last_text,
        }
    }

    fn with_clipboard<T>(&self, f: impl FnOnce(&mut Clipboard) -> std::result::Result<T, arboard::Error>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::clipboard("clipboard lock poisoned"))?;
        if guard.is_none() {
            let clipboard = Clipboard::new()
                .map_err(|e| AppError::clipboard(format!("Could not access clipboard: {}", e)))?;
            *guard = Some(clipboard);
        }
        match guard.as_mut() {
            Some(clipboard) => f(clipboard).map_err(|e| AppError::clipboard(e.to_string())),
            None => Err(AppError::clipboard("clipboard unavailable")),
        }
    }
}

impl ClipboardSink for SystemClipboard {
    fn write_image(&self, png: &[u8]) -> Result<()> {
        let rgba = ImageProcessor::decode_png(png)?;
        let (width, height) = rgba.dimensions();
        let data = ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        self.with_clipboard(|c| c.set_image(data))
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.last_text.replace(text);
        self.with_clipboard(|c| c.set_text(text.to_string()))
    }
}

/// Background thread recording new clipboard text into history.
pub struct ClipboardWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ClipboardWatcher {
    pub fn spawn(history: Arc<dyn HistorySink>, last_text: LastText) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::spawn(move || {
            let mut clipboard = match Clipboard::new() {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Clipboard watcher disabled: {}", e);
                    return;
                }
            };
            // Whatever is on the clipboard at startup is not new.
            if let Ok(text) = clipboard.get_text() {
                last_text.replace(&text);
            }

            while !thread_stop.load(Ordering::Relaxed) {
                if let Ok(text) = clipboard.get_text() {
                    if !text.is_empty() && last_text.replace(&text) {
                        log::debug!("Clipboard changed ({} chars)", text.chars().count());
                        history.add_entry(&text);
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ClipboardWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
