//! Overlay window bookkeeping for one session at a time.
//!
//! The controller owns the open window and the payload waiting for it. The
//! frame is delivered only after the window reports `Loaded`, and the window
//! is shown only after it reports `Ready`.

use super::{FramePayload, OverlayEventSender, OverlayHost, OverlaySpec, OverlayWindow, WindowHandle, WindowId};
use crate::error::{AppError, Result};
use std::sync::Arc;

pub struct OverlayController {
    host: Arc<dyn OverlayHost>,
    window: Option<Box<dyn OverlayWindow>>,
    pending: Option<FramePayload>,
}

impl OverlayController {
    pub fn new(host: Arc<dyn OverlayHost>) -> Self {
        Self {
            host,
            window: None,
            pending: None,
        }
    }

    /// Opens the overlay for `payload`; the frame is held until `Loaded`.
    pub fn open(&mut self, payload: FramePayload, events: OverlayEventSender) -> Result<WindowHandle> {
        if self.window.is_some() {
            return Err(AppError::SessionBusy);
        }

        let spec = OverlaySpec {
            id: WindowId::next(),
            mode: payload.mode,
            bounds: payload.bounds,
        };
        log::debug!("Opening {} ({}) over {:?}", spec.id, spec.mode, spec.bounds);

        let window = self.host.open(spec, events)?;
        let handle = window.handle().clone();
        self.window = Some(window);
        self.pending = Some(payload);
        Ok(handle)
    }

    /// The open window, if `id` names it and it is still alive.
    fn current(&self, id: WindowId) -> Option<&dyn OverlayWindow> {
        self.window
            .as_deref()
            .filter(|w| w.handle().id() == id && w.handle().is_valid())
    }

    pub fn is_current(&self, id: WindowId) -> bool {
        self.current(id).is_some()
    }

    pub fn on_loaded(&mut self, id: WindowId) -> Result<()> {
        if !self.is_current(id) {
            return Ok(());
        }
        let Some(payload) = self.pending.take() else {
            log::warn!("{} loaded twice; frame already delivered", id);
            return Ok(());
        };
        match self.current(id) {
            Some(window) => window.deliver(payload),
            None => Ok(()),
        }
    }

    /// Shows, focuses and starts taking input.
    pub fn on_ready(&mut self, id: WindowId) -> Result<()> {
        let Some(window) = self.current(id) else {
            return Ok(());
        };
        window.show()?;
        window.set_mouse_passthrough(false)
    }

    pub fn with_window(&self, id: WindowId, f: impl FnOnce(&dyn OverlayWindow) -> Result<()>) -> Result<()> {
        match self.current(id) {
            Some(window) => f(window),
            None => Err(AppError::ui(format!("{} is not open", id))),
        }
    }

    /// Asks the window to close. `Closed` arrives later through the event channel.
    pub fn close(&mut self, id: WindowId) -> Result<()> {
        self.with_window(id, |w| w.close())
    }

    /// Forgets the window after it closed. Returns whether it was the open one.
    pub fn on_closed(&mut self, id: WindowId) -> bool {
        match &self.window {
            Some(window) if window.handle().id() == id => {
                window.handle().invalidate();
                self.window = None;
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Drops the window without waiting for `Closed`, e.g. when it stopped responding.
    pub fn abandon(&mut self) -> Option<WindowId> {
        let window = self.window.take()?;
        self.pending = None;
        let id = window.handle().id();
        window.handle().invalidate();
        Some(id)
    }
}
