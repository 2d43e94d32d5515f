//! Recording fakes for the session and router collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use clipcap_core::capture::{CaptureSource, DisplayInfo, DisplaySource, PointerTracker, SourceHandle};
use clipcap_core::clipboard::ClipboardSink;
use clipcap_core::error::{AppError, Result};
use clipcap_core::geometry::Rect;
use clipcap_core::history::HistorySink;
use clipcap_core::notify::{Notifier, Severity};
use clipcap_core::ocr::TextRecognizer;
use clipcap_core::permissions::{PermissionProbe, PermissionStatus, PromptChoice};
use clipcap_core::router::{ArtifactRouter, SaveDialog, SaveRequest};
use clipcap_core::session::{SessionConfig, Services};
use clipcap_core::ui::{
    FramePayload, OverlayCommand, OverlayEvent, OverlayEventSender, OverlayHost, OverlayMessage, OverlaySpec,
    OverlayWindow, WindowHandle, WindowId,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

/// A frame whose every pixel encodes its own coordinates.
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, 255]))
}

pub fn display(width: f32, height: f32) -> DisplayInfo {
    display_scaled(width, height, 1.0)
}

pub fn display_scaled(width: f32, height: f32, scale_factor: f32) -> DisplayInfo {
    DisplayInfo {
        id: 1,
        bounds: Rect::new(0.0, 0.0, width, height),
        scale_factor,
        is_primary: true,
    }
}

// ---- displays ----

pub enum Frame {
    Image(Arc<DynamicImage>),
    NoSource,
    Fails(String),
}

pub struct FakeDisplays {
    pub displays: Vec<DisplayInfo>,
    pub frame: Frame,
    /// When set, `capture_source` waits for a permit.
    pub gate: Option<Arc<Notify>>,
    pub requested: Mutex<Vec<(u32, u32)>>,
}

impl FakeDisplays {
    pub fn with_frame(display: DisplayInfo, frame: RgbaImage) -> Self {
        Self {
            displays: vec![display],
            frame: Frame::Image(Arc::new(DynamicImage::ImageRgba8(frame))),
            gate: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(display: DisplayInfo, frame: Frame) -> Self {
        Self {
            displays: vec![display],
            frame,
            gate: None,
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DisplaySource for FakeDisplays {
    async fn displays(&self) -> Result<Vec<DisplayInfo>> {
        Ok(self.displays.clone())
    }

    async fn capture_source(
        &self,
        display: &DisplayInfo,
        width: u32,
        height: u32,
    ) -> Result<Option<CaptureSource>> {
        self.requested.lock().unwrap().push((width, height));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.frame {
            Frame::Image(image) => Ok(Some(CaptureSource {
                handle: SourceHandle::for_display(display.id),
                thumbnail: image.clone(),
            })),
            Frame::NoSource => Ok(None),
            Frame::Fails(msg) => Err(AppError::capture(msg.clone())),
        }
    }
}

// ---- permissions ----

pub struct FakePermissions {
    pub status: PermissionStatus,
    pub choice: PromptChoice,
    pub prompts: AtomicUsize,
    pub opened: AtomicUsize,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted, PromptChoice::Dismiss)
    }

    pub fn new(status: PermissionStatus, choice: PromptChoice) -> Self {
        Self {
            status,
            choice,
            prompts: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PermissionProbe for FakePermissions {
    async fn status(&self) -> PermissionStatus {
        self.status
    }

    async fn prompt(&self) -> PromptChoice {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.choice
    }

    fn open_settings(&self) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---- overlays ----

/// Overlay host that answers the ready handshake immediately and records commands.
#[derive(Default)]
pub struct FakeHost {
    pub refuse: AtomicBool,
    pub opened: Mutex<Vec<OverlaySpec>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub delivered: Arc<Mutex<Option<FramePayload>>>,
    hung: Arc<AtomicBool>,
    current: Mutex<Option<(WindowId, OverlayEventSender)>>,
}

impl FakeHost {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands().iter().any(|c| c == name)
    }

    fn current(&self) -> (WindowId, OverlayEventSender) {
        self.current.lock().unwrap().clone().expect("no overlay was opened")
    }

    /// Simulates the user acting inside the open overlay.
    pub fn user(&self, message: OverlayMessage) {
        let (id, events) = self.current();
        events.send(OverlayEvent::Message(id, message)).unwrap();
    }

    /// Simulates the window going away on its own (Escape, OS close).
    pub fn window_closed(&self) {
        let (id, events) = self.current();
        events.send(OverlayEvent::Closed(id)).unwrap();
    }

    pub fn window_id(&self) -> WindowId {
        self.current().0
    }

    /// From now on every command sent to the window fails.
    pub fn hang(&self) {
        self.hung.store(true, Ordering::SeqCst);
    }
}

impl OverlayHost for FakeHost {
    fn open(&self, spec: OverlaySpec, events: OverlayEventSender) -> Result<Box<dyn OverlayWindow>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AppError::ui("no window system"));
        }
        let id = spec.id;
        self.opened.lock().unwrap().push(spec);
        *self.current.lock().unwrap() = Some((id, events.clone()));
        events.send(OverlayEvent::Loaded(id)).unwrap();
        Ok(Box::new(FakeWindow {
            handle: WindowHandle::new(id),
            events,
            commands: self.commands.clone(),
            delivered: self.delivered.clone(),
            hung: self.hung.clone(),
        }))
    }
}

struct FakeWindow {
    handle: WindowHandle,
    events: OverlayEventSender,
    commands: Arc<Mutex<Vec<String>>>,
    delivered: Arc<Mutex<Option<FramePayload>>>,
    hung: Arc<AtomicBool>,
}

impl OverlayWindow for FakeWindow {
    fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    fn send(&self, command: OverlayCommand) -> Result<()> {
        if self.hung.load(Ordering::SeqCst) {
            return Err(AppError::ui("overlay event loop is gone"));
        }
        let id = self.handle.id();
        let name = match &command {
            OverlayCommand::Deliver(_) => "Deliver".to_string(),
            other => format!("{:?}", other),
        };
        self.commands.lock().unwrap().push(name);
        match command {
            OverlayCommand::Deliver(payload) => {
                *self.delivered.lock().unwrap() = Some(payload);
                let _ = self.events.send(OverlayEvent::Ready(id));
            }
            OverlayCommand::Close => {
                let _ = self.events.send(OverlayEvent::Closed(id));
            }
            _ => {}
        }
        Ok(())
    }
}

// ---- router collaborators ----

#[derive(Default)]
pub struct FakeClipboard {
    pub images: Mutex<Vec<Vec<u8>>>,
    pub texts: Mutex<Vec<String>>,
}

impl FakeClipboard {
    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }
}

impl ClipboardSink for FakeClipboard {
    fn write_image(&self, png: &[u8]) -> Result<()> {
        self.images.lock().unwrap().push(png.to_vec());
        Ok(())
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHistory {
    pub entries: Mutex<Vec<String>>,
}

impl FakeHistory {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl HistorySink for FakeHistory {
    fn add_entry(&self, text: &str) {
        self.entries.lock().unwrap().push(text.to_string());
    }
}

pub struct FakeRecognizer {
    pub answer: std::result::Result<String, String>,
    pub calls: Mutex<Vec<(usize, Vec<String>)>>,
    delay: Duration,
}

impl FakeRecognizer {
    pub fn answering(answer: std::result::Result<&str, &str>) -> Self {
        Self {
            answer: answer.map(str::to_string).map_err(str::to_string),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Takes `delay` before answering, like a real OCR run.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(&self, png: &[u8], languages: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push((png.len(), languages.to_vec()));
        tokio::time::sleep(self.delay).await;
        self.answer.clone().map_err(AppError::recognition)
    }
}

pub struct FakeDialogs {
    pub answer: Option<PathBuf>,
    pub requests: Mutex<Vec<SaveRequest>>,
}

impl FakeDialogs {
    pub fn answering(answer: Option<&Path>) -> Self {
        Self {
            answer: answer.map(Path::to_path_buf),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SaveDialog for FakeDialogs {
    async fn save_file(&self, request: SaveRequest) -> Option<PathBuf> {
        self.requests.lock().unwrap().push(request);
        self.answer.clone()
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub notes: Mutex<Vec<(String, Severity)>>,
    pub refreshes: AtomicUsize,
}

impl FakeNotifier {
    pub fn notes(&self) -> Vec<(String, Severity)> {
        self.notes.lock().unwrap().clone()
    }

    pub fn saw(&self, severity: Severity, fragment: &str) -> bool {
        self.notes()
            .iter()
            .any(|(msg, s)| *s == severity && msg.contains(fragment))
    }
}

impl Notifier for FakeNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.notes.lock().unwrap().push((message.to_string(), severity));
    }

    fn refresh_history(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---- assembly ----

pub struct Fakes {
    pub clipboard: Arc<FakeClipboard>,
    pub history: Arc<FakeHistory>,
    pub recognizer: Arc<FakeRecognizer>,
    pub dialogs: Arc<FakeDialogs>,
    pub notifier: Arc<FakeNotifier>,
}

impl Fakes {
    pub fn new(recognizer: FakeRecognizer, dialogs: FakeDialogs) -> Self {
        Self {
            clipboard: Arc::new(FakeClipboard::default()),
            history: Arc::new(FakeHistory::default()),
            recognizer: Arc::new(recognizer),
            dialogs: Arc::new(dialogs),
            notifier: Arc::new(FakeNotifier::default()),
        }
    }

    pub fn router(&self) -> ArtifactRouter {
        ArtifactRouter::new(
            self.clipboard.clone(),
            self.history.clone(),
            self.recognizer.clone(),
            self.dialogs.clone(),
            self.notifier.clone(),
            vec!["eng".to_string(), "tur".to_string()],
        )
        .with_default_dirs(None, None)
    }

    pub fn services(
        &self,
        displays: Arc<FakeDisplays>,
        permissions: Arc<FakePermissions>,
        host: Arc<FakeHost>,
        temp_dir: &Path,
    ) -> Services {
        Services {
            displays,
            permissions,
            overlays: host,
            router: self.router(),
            notifier: self.notifier.clone(),
            pointer: PointerTracker::new(),
            config: SessionConfig {
                temp_dir: temp_dir.to_path_buf(),
                ffmpeg: PathBuf::from("ffmpeg"),
                settings_file: None,
            },
        }
    }
}
