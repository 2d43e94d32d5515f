//! Capture overlays.
//!
//! An overlay is a borderless, transparent, always-on-top window covering one
//! display. The session talks to it through two seams:
//!
//! - [`OverlayHost`] opens windows and hands back an [`OverlayWindow`] that
//!   accepts [`OverlayCommand`]s.
//! - Windows report back through an [`OverlayEventSender`]: `Loaded` once
//!   the surface exists, `Ready` once the delivered frame is painted,
//!   `Message` for user actions, and `Closed` exactly once when the window
//!   goes away for any reason.
//!
//! The production host is [`EguiOverlayHost`], driven by an [`OverlayPump`]
//! on the main thread. Everything else here is plain data so the session can
//! be exercised without a display.
//!
//! # Submodules
//!
//! - [`controller`]: per-session window bookkeeping and the ready handshake
//! - [`annotate`]: annotation shapes, rasterizers and flattening
//! - [`host`]: the egui host and main-thread pump
//! - `overlay_app`, `selection`, `rendering`, `state`: the egui surfaces

pub mod annotate;
pub mod controller;
pub mod host;
mod overlay_app;
mod rendering;
mod selection;
mod state;

pub use controller::OverlayController;
pub use host::{overlay_pump, EguiOverlayHost, OverlayPump};

use crate::capture::SourceHandle;
use crate::error::{AppError, Result};
use crate::geometry::Rect;
use crate::mode::CaptureMode;
use crate::recording::ChunkReceiver;
use crate::settings::VideoQuality;
use image::DynamicImage;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

/// Reference to an overlay window that goes invalid exactly once, when it closes.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    id: WindowId,
    alive: Arc<AtomicBool>,
}

impl WindowHandle {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the window closed. Returns `true` only for the call that did it.
    pub fn invalidate(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }
}

/// Where and what to open.
#[derive(Debug, Clone)]
pub struct OverlaySpec {
    pub id: WindowId,
    pub mode: CaptureMode,
    /// Display bounds in desktop logical coordinates.
    pub bounds: Rect,
}

/// Everything a surface needs, delivered in one message after `Loaded`.
#[derive(Clone)]
pub struct FramePayload {
    pub frame: Arc<DynamicImage>,
    pub mode: CaptureMode,
    pub source: SourceHandle,
    pub bounds: Rect,
    pub scale_factor: f32,
    pub video_quality: VideoQuality,
    pub ffmpeg: PathBuf,
}

impl fmt::Debug for FramePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePayload")
            .field("frame", &(self.frame.width(), self.frame.height()))
            .field("mode", &self.mode)
            .field("source", &self.source)
            .field("scale_factor", &self.scale_factor)
            .field("video_quality", &self.video_quality)
            .finish()
    }
}

/// Controller -> window.
#[derive(Debug)]
pub enum OverlayCommand {
    Deliver(FramePayload),
    /// Start painting and take focus.
    Show,
    /// Stop painting and let input through.
    Hide,
    SetAlwaysOnTop(bool),
    SetMousePassthrough(bool),
    Close,
}

/// What the user did inside a surface.
pub enum OverlayMessage {
    CopyImage(Vec<u8>),
    SaveImage(Vec<u8>),
    OcrRequest(Vec<u8>),
    /// Recording began; encoded chunks arrive on `chunks` until it closes.
    RecordStart { chunks: ChunkReceiver },
    /// The recorder has flushed and closed the chunk stream.
    RecordStop,
    CloseRequested,
    SetMousePassthrough(bool),
}

impl fmt::Debug for OverlayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayMessage::CopyImage(png) => write!(f, "CopyImage({} bytes)", png.len()),
            OverlayMessage::SaveImage(png) => write!(f, "SaveImage({} bytes)", png.len()),
            OverlayMessage::OcrRequest(png) => write!(f, "OcrRequest({} bytes)", png.len()),
            OverlayMessage::RecordStart { .. } => f.write_str("RecordStart"),
            OverlayMessage::RecordStop => f.write_str("RecordStop"),
            OverlayMessage::CloseRequested => f.write_str("CloseRequested"),
            OverlayMessage::SetMousePassthrough(on) => write!(f, "SetMousePassthrough({})", on),
        }
    }
}

/// Window -> session.
#[derive(Debug)]
pub enum OverlayEvent {
    Loaded(WindowId),
    Ready(WindowId),
    Message(WindowId, OverlayMessage),
    Closed(WindowId),
}

impl OverlayEvent {
    pub fn window(&self) -> WindowId {
        match self {
            OverlayEvent::Loaded(id)
            | OverlayEvent::Ready(id)
            | OverlayEvent::Message(id, _)
            | OverlayEvent::Closed(id) => *id,
        }
    }
}

pub type OverlayEventSender = mpsc::UnboundedSender<OverlayEvent>;
pub type OverlayEventReceiver = mpsc::UnboundedReceiver<OverlayEvent>;

/// An open overlay window.
pub trait OverlayWindow: Send {
    fn handle(&self) -> &WindowHandle;

    fn send(&self, command: OverlayCommand) -> Result<()>;

    fn deliver(&self, payload: FramePayload) -> Result<()> {
        self.send(OverlayCommand::Deliver(payload))
    }

    fn show(&self) -> Result<()> {
        self.send(OverlayCommand::Show)
    }

    fn hide(&self) -> Result<()> {
        self.send(OverlayCommand::Hide)
    }

    fn set_always_on_top(&self, on: bool) -> Result<()> {
        self.send(OverlayCommand::SetAlwaysOnTop(on))
    }

    fn set_mouse_passthrough(&self, on: bool) -> Result<()> {
        self.send(OverlayCommand::SetMousePassthrough(on))
    }

    fn close(&self) -> Result<()> {
        self.send(OverlayCommand::Close)
    }
}

/// Opens overlay windows.
pub trait OverlayHost: Send + Sync {
    /// Opens a window for `spec`. It must report `Closed(spec.id)` on `events`
    /// exactly once, however it ends.
    fn open(&self, spec: OverlaySpec, events: OverlayEventSender) -> Result<Box<dyn OverlayWindow>>;
}

/// [`OverlayWindow`] over a std channel, shared by hosts that poll commands.
pub struct ChannelWindow {
    handle: WindowHandle,
    commands: std::sync::mpsc::Sender<OverlayCommand>,
}

impl ChannelWindow {
    pub fn new(handle: WindowHandle, commands: std::sync::mpsc::Sender<OverlayCommand>) -> Self {
        Self { handle, commands }
    }
}

impl OverlayWindow for ChannelWindow {
    fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    fn send(&self, command: OverlayCommand) -> Result<()> {
        if !self.handle.is_valid() {
            return Err(AppError::ui(format!("{} is closed", self.handle.id())));
        }
        self.commands
            .send(command)
            .map_err(|_| AppError::ui(format!("{} stopped listening", self.handle.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_invalidates_exactly_once() {
        let handle = WindowHandle::new(WindowId::next());
        let copy = handle.clone();
        assert!(copy.is_valid());
        assert!(handle.invalidate());
        assert!(!handle.invalidate());
        assert!(!copy.is_valid());
    }

    #[test]
    fn channel_window_refuses_commands_after_close() {
        let (tx, rx) = std::sync::mpsc::channel();
        let window = ChannelWindow::new(WindowHandle::new(WindowId::next()), tx);
        window.show().unwrap();
        assert!(matches!(rx.try_recv(), Ok(OverlayCommand::Show)));

        window.handle().invalidate();
        assert!(window.close().is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn window_ids_are_unique() {
        assert_ne!(WindowId::next(), WindowId::next());
    }
}
