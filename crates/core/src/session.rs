//! The capture session state machine.
//!
//! One actor task owns [`SessionState`] and the [`OverlayController`]; every
//! request reaches it through a [`SessionHandle`]. Slow steps (permission
//! probe, frame acquisition, routing) run on spawned tasks that report back
//! through the actor's mailbox, so the actor keeps answering while they run.
//! Routing tasks are tracked; [`SessionHandle::shutdown`] returns only after
//! they have finished, so a result is never dropped with the runtime.
//!
//! ```text
//! Idle ─start─▶ PermissionCheck ─granted─▶ Acquiring ─frame─▶ OverlayActive ─terminal─▶ Finalizing
//!  ▲               │ denied                  │ no source           │ closed                 │ closed
//!  └───────────────┴─────────────────────────┴─────────────────────┴────────────────────────┘
//! ```
//!
//! A `start_capture` while not idle is answered with [`StartOutcome::Busy`]
//! and a warning notification. Every path back to `Idle` clears the
//! `capturing` flag and the window reference.

use crate::capture::{DisplayInfo, DisplayResolver, DisplaySource, PointerTracker, ResolvedTarget, SourceHandle};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::mode::CaptureMode;
use crate::notify::{Notifier, Severity};
use crate::permissions::{PermissionProbe, PermissionStatus, PromptChoice};
use crate::recording::{spawn_chunk_writer, ChunkReceiver, TempVideoFile};
use crate::router::{ArtifactRouter, WindowAction};
use crate::settings::{Settings, VideoQuality};
use crate::ui::{
    FramePayload, OverlayController, OverlayEvent, OverlayEventReceiver, OverlayEventSender, OverlayHost,
    OverlayMessage, WindowHandle, WindowId,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

const MAILBOX_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    PermissionCheck,
    Acquiring,
    OverlayActive,
    Finalizing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::PermissionCheck => "permission-check",
            SessionPhase::Acquiring => "acquiring",
            SessionPhase::OverlayActive => "overlay-active",
            SessionPhase::Finalizing => "finalizing",
        };
        f.write_str(s)
    }
}

/// Answer to [`SessionHandle::start_capture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The overlay is open.
    Started,
    /// Another session is running; nothing was done.
    Busy,
    PermissionDenied,
    SourceUnavailable,
    Failed(String),
}

/// Read-only view of the session for callers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub capturing: bool,
    pub mode: Option<CaptureMode>,
    pub display: Option<u32>,
    pub source: Option<SourceHandle>,
    pub window: Option<WindowId>,
}

/// Machine-level settings the session reads at capture time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub temp_dir: PathBuf,
    pub ffmpeg: PathBuf,
    /// Settings file to read the video quality from; `None` uses defaults.
    pub settings_file: Option<PathBuf>,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            ffmpeg: config.ffmpeg_path.clone(),
            settings_file: Settings::config_path(),
        }
    }

    fn video_quality(&self) -> VideoQuality {
        self.settings_file
            .as_deref()
            .map(Settings::load_from)
            .unwrap_or_default()
            .video_quality
    }
}

/// Collaborators the session drives.
pub struct Services {
    pub displays: Arc<dyn DisplaySource>,
    pub permissions: Arc<dyn PermissionProbe>,
    pub overlays: Arc<dyn OverlayHost>,
    pub router: ArtifactRouter,
    pub notifier: Arc<dyn Notifier>,
    pub pointer: PointerTracker,
    pub config: SessionConfig,
}

struct PendingRecording {
    temp: TempVideoFile,
    writer: JoinHandle<Result<u64>>,
}

struct ActiveSession {
    mode: CaptureMode,
    display: Option<DisplayInfo>,
    source: Option<SourceHandle>,
    window: Option<WindowHandle>,
    recording: Option<PendingRecording>,
    reply: Option<oneshot::Sender<StartOutcome>>,
}

/// Everything the state machine owns. Mutated only by the session actor.
pub struct SessionState {
    capturing: bool,
    phase: SessionPhase,
    active: Option<ActiveSession>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            capturing: false,
            phase: SessionPhase::Idle,
            active: None,
        }
    }

    pub fn capturing(&self) -> bool {
        self.capturing
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.capturing || self.phase != SessionPhase::Idle
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.active.as_ref().map(|a| a.mode)
    }

    /// The open overlay, if its handle is still valid.
    pub fn window(&self) -> Option<&WindowHandle> {
        self.active
            .as_ref()
            .and_then(|a| a.window.as_ref())
            .filter(|w| w.is_valid())
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            capturing: self.capturing,
            mode: self.mode(),
            display: self.active.as_ref().and_then(|a| a.display.as_ref()).map(|d| d.id),
            source: self.active.as_ref().and_then(|a| a.source.clone()),
            window: self.window().map(WindowHandle::id),
        }
    }
}

enum Command {
    Start {
        mode: CaptureMode,
        reply: oneshot::Sender<StartOutcome>,
    },
    Cancel,
    Status(oneshot::Sender<SessionStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Completions of work the actor spawned.
enum Internal {
    PermissionChecked(bool),
    Resolved(Result<ResolvedTarget>),
    Routed { window: WindowId, action: WindowAction },
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    /// Requests a capture. Resolves once the overlay is open or the attempt ended.
    pub async fn start_capture(&self, mode: CaptureMode) -> StartOutcome {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(Command::Start { mode, reply }).await.is_err() {
            return StartOutcome::Failed("capture session is not running".to_string());
        }
        answer
            .await
            .unwrap_or_else(|_| StartOutcome::Failed("capture session stopped".to_string()))
    }

    /// Closes the active overlay, as Escape does.
    pub async fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel).await;
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(Command::Status(reply)).await.ok()?;
        answer.await.ok()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Waits until the session is back to idle.
    pub async fn wait_idle(&self) {
        let mut phase = self.phase.clone();
        let _ = phase.wait_for(|p| *p == SessionPhase::Idle).await;
    }

    /// Stops the actor, closing any open overlay.
    ///
    /// Waits for in-flight routing (OCR, saves, interrupted recordings) so
    /// the caller may drop the runtime afterwards.
    pub async fn shutdown(&self) {
        let (done, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).await.is_ok() {
            let _ = stopped.await;
        }
    }
}

pub struct CaptureSession {
    services: Services,
    resolver: Arc<DisplayResolver>,
    state: SessionState,
    controller: OverlayController,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events_tx: OverlayEventSender,
    events_rx: OverlayEventReceiver,
    phase_tx: watch::Sender<SessionPhase>,
    tasks: JoinSet<()>,
}

impl CaptureSession {
    /// Spawns the session actor on the current tokio runtime.
    pub fn spawn(services: Services) -> SessionHandle {
        let (commands_tx, commands) = mpsc::channel(MAILBOX_SIZE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);

        let session = CaptureSession {
            resolver: Arc::new(DisplayResolver::new(services.displays.clone())),
            controller: OverlayController::new(services.overlays.clone()),
            services,
            state: SessionState::new(),
            commands,
            internal_tx,
            internal_rx,
            events_tx,
            events_rx,
            phase_tx,
            tasks: JoinSet::new(),
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: commands_tx,
            phase: phase_rx,
        }
    }

    async fn run(mut self) {
        log::debug!("Capture session actor started");
        let done = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => break Some(done),
                    None => break None,
                    Some(command) => self.on_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.on_internal(internal),
                Some(event) = self.events_rx.recv() => self.on_event(event).await,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => reap(joined),
            }
        };

        if let Some(window) = self.state.window().cloned() {
            let _ = self.controller.close(window.id());
        }
        self.end_session(StartOutcome::Failed("capture session stopped".to_string()));
        if !self.tasks.is_empty() {
            log::info!("Waiting for {} routing task(s) to finish", self.tasks.len());
        }
        while let Some(joined) = self.tasks.join_next().await {
            reap(joined);
        }
        log::debug!("Capture session actor stopped");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.state.phase != phase {
            log::debug!("Session phase {} -> {}", self.state.phase, phase);
        }
        self.state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Returns to idle from any state, answering a pending start if there is one.
    ///
    /// A recording that was never stopped is handed to the router so its temp
    /// file is kept and its path shown.
    fn end_session(&mut self, outcome: StartOutcome) {
        if let Some(mut active) = self.state.active.take() {
            if let Some(window) = active.window.take() {
                window.invalidate();
            }
            if let Some(recording) = active.recording.take() {
                log::warn!("{} session ended mid-recording; keeping the file", active.mode);
                let router = self.services.router.clone();
                self.tasks.spawn(async move {
                    router.abandon_recording(recording.temp, recording.writer).await;
                });
            }
            if let Some(reply) = active.reply.take() {
                let _ = reply.send(outcome);
            }
            log::info!("{} session ended", active.mode);
        }
        self.state.capturing = false;
        self.set_phase(SessionPhase::Idle);
    }

    fn reply(&mut self, outcome: StartOutcome) {
        if let Some(reply) = self.state.active.as_mut().and_then(|a| a.reply.take()) {
            let _ = reply.send(outcome);
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start { mode, reply } => self.start(mode, reply),
            Command::Cancel => self.cancel(),
            Command::Status(reply) => {
                let _ = reply.send(self.state.status());
            }
            Command::Shutdown(_) => {}
        }
    }

    fn start(&mut self, mode: CaptureMode, reply: oneshot::Sender<StartOutcome>) {
        if self.state.is_busy() {
            log::warn!("Ignoring {} capture: {}", mode, AppError::SessionBusy);
            self.services
                .notifier
                .notify("A capture is already in progress", Severity::Warning);
            let _ = reply.send(StartOutcome::Busy);
            return;
        }

        log::info!("Starting {} capture", mode);
        self.state.active = Some(ActiveSession {
            mode,
            display: None,
            source: None,
            window: None,
            recording: None,
            reply: Some(reply),
        });
        self.set_phase(SessionPhase::PermissionCheck);

        let permissions = self.services.permissions.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let granted = match permissions.status().await {
                PermissionStatus::Granted => true,
                PermissionStatus::Denied => {
                    if permissions.prompt().await == PromptChoice::OpenSettings {
                        if let Err(e) = permissions.open_settings() {
                            log::warn!("Could not open system settings: {}", e);
                        }
                    }
                    false
                }
            };
            let _ = tx.send(Internal::PermissionChecked(granted));
        });
    }

    fn cancel(&mut self) {
        let Some(id) = self.state.window().map(WindowHandle::id) else {
            return;
        };
        log::info!("Cancelling {}", id);
        if let Err(e) = self.controller.close(id) {
            log::warn!("{}; dropping it", e);
            self.controller.abandon();
            self.end_session(StartOutcome::Failed(e.to_string()));
        }
    }

    fn on_internal(&mut self, internal: Internal) {
        match internal {
            Internal::PermissionChecked(granted) => self.on_permission(granted),
            Internal::Resolved(result) => self.on_resolved(result),
            Internal::Routed { window, action } => self.on_routed(window, action),
        }
    }

    fn on_permission(&mut self, granted: bool) {
        if self.state.phase != SessionPhase::PermissionCheck {
            return;
        }
        if !granted {
            log::warn!("{}", AppError::PermissionDenied);
            self.end_session(StartOutcome::PermissionDenied);
            return;
        }

        self.state.capturing = true;
        self.set_phase(SessionPhase::Acquiring);

        let resolver = self.resolver.clone();
        let pointer = self.services.pointer.position();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Internal::Resolved(resolver.resolve(pointer).await));
        });
    }

    fn on_resolved(&mut self, result: Result<ResolvedTarget>) {
        if self.state.phase != SessionPhase::Acquiring {
            return;
        }
        let Some(mode) = self.state.mode() else {
            return;
        };

        let target = match result {
            Ok(target) => target,
            Err(AppError::SourceUnavailable) => {
                log::warn!("{}; no overlay opened", AppError::SourceUnavailable);
                self.end_session(StartOutcome::SourceUnavailable);
                return;
            }
            Err(e) => {
                log::error!("Frame acquisition failed: {}", e);
                self.services
                    .notifier
                    .notify(&format!("Capture failed: {}", e), Severity::Error);
                self.end_session(StartOutcome::Failed(e.to_string()));
                return;
            }
        };

        let payload = FramePayload {
            frame: target.source.thumbnail.clone(),
            mode,
            source: target.source.handle.clone(),
            bounds: target.display.bounds,
            scale_factor: target.display.scale_factor,
            video_quality: self.services.config.video_quality(),
            ffmpeg: self.services.config.ffmpeg.clone(),
        };

        match self.controller.open(payload, self.events_tx.clone()) {
            Ok(handle) => {
                log::info!("{} opened on {}", handle.id(), target.display);
                if let Some(active) = self.state.active.as_mut() {
                    active.display = Some(target.display);
                    active.source = Some(target.source.handle);
                    active.window = Some(handle);
                }
                self.set_phase(SessionPhase::OverlayActive);
                self.reply(StartOutcome::Started);
            }
            Err(e) => {
                log::error!("Opening overlay failed: {}", e);
                self.services
                    .notifier
                    .notify(&format!("Could not open capture overlay: {}", e), Severity::Error);
                self.end_session(StartOutcome::Failed(e.to_string()));
            }
        }
    }

    fn on_routed(&mut self, window: WindowId, action: WindowAction) {
        let result = match action {
            WindowAction::Close => self.controller.close(window),
            WindowAction::KeepOpen => self
                .controller
                .with_window(window, |w| w.set_always_on_top(true)),
        };
        if let Err(e) = result {
            log::debug!("After routing: {}", e);
        }
    }

    async fn on_event(&mut self, event: OverlayEvent) {
        let id = event.window();
        if let OverlayEvent::Closed(_) = event {
            self.on_closed(id);
            return;
        }
        if !self.controller.is_current(id) {
            log::debug!("Ignoring event from stale {}", id);
            return;
        }
        let Some(mode) = self.state.mode() else {
            return;
        };

        let result = match event {
            OverlayEvent::Loaded(id) => self.controller.on_loaded(id),
            OverlayEvent::Ready(id) => self.controller.on_ready(id),
            OverlayEvent::Message(id, message) => self.on_message(id, mode, message).await,
            OverlayEvent::Closed(_) => Ok(()),
        };

        if let Err(e) = result {
            log::error!("{} stopped responding: {}", id, e);
            self.controller.abandon();
            self.end_session(StartOutcome::Failed(e.to_string()));
        }
    }

    fn on_closed(&mut self, id: WindowId) {
        if !self.controller.on_closed(id) {
            log::debug!("{} closed (not the active overlay)", id);
            return;
        }
        log::info!("{} closed", id);
        self.end_session(StartOutcome::Failed("overlay closed".to_string()));
    }

    async fn on_message(&mut self, id: WindowId, mode: CaptureMode, message: OverlayMessage) -> Result<()> {
        log::debug!("{} -> {:?}", id, message);
        match message {
            OverlayMessage::CloseRequested => return self.controller.close(id),
            OverlayMessage::SetMousePassthrough(on) => {
                return self.controller.with_window(id, |w| w.set_mouse_passthrough(on));
            }
            _ => {}
        }

        match mode {
            CaptureMode::Draw => self.on_draw_message(id, message),
            CaptureMode::Ocr => self.on_ocr_message(id, message),
            CaptureMode::Video => self.on_video_message(id, message).await,
        }
    }

    fn on_draw_message(&mut self, id: WindowId, message: OverlayMessage) -> Result<()> {
        let router = self.services.router.clone();
        let tx = self.internal_tx.clone();
        match message {
            OverlayMessage::CopyImage(png) => {
                self.set_phase(SessionPhase::Finalizing);
                self.tasks.spawn(async move {
                    let action = router.copy_image(&png).await;
                    let _ = tx.send(Internal::Routed { window: id, action });
                });
                Ok(())
            }
            OverlayMessage::SaveImage(png) => {
                // the dialog has to come up above the overlay
                self.controller.with_window(id, |w| w.set_always_on_top(false))?;
                self.tasks.spawn(async move {
                    let action = router.save_image(&png).await;
                    let _ = tx.send(Internal::Routed { window: id, action });
                });
                Ok(())
            }
            other => {
                log::warn!("Draw overlay sent unexpected {:?}", other);
                Ok(())
            }
        }
    }

    fn on_ocr_message(&mut self, id: WindowId, message: OverlayMessage) -> Result<()> {
        match message {
            OverlayMessage::OcrRequest(png) => {
                self.set_phase(SessionPhase::Finalizing);
                self.controller.close(id)?;
                let router = self.services.router.clone();
                self.tasks.spawn(async move {
                    router.recognize(&png).await;
                });
                Ok(())
            }
            other => {
                log::warn!("OCR overlay sent unexpected {:?}", other);
                Ok(())
            }
        }
    }

    async fn on_video_message(&mut self, id: WindowId, message: OverlayMessage) -> Result<()> {
        match message {
            OverlayMessage::RecordStart { chunks } => {
                self.begin_recording(chunks).await;
                Ok(())
            }
            OverlayMessage::RecordStop => {
                if self.state.active.as_ref().is_none_or(|a| a.recording.is_none()) {
                    log::warn!("Recording stopped before it started");
                    return self.controller.close(id);
                }

                // a failed hide leaves the recording in place for end_session
                self.controller.with_window(id, |w| w.hide())?;
                let Some(recording) = self.state.active.as_mut().and_then(|a| a.recording.take()) else {
                    return Ok(());
                };
                self.set_phase(SessionPhase::Finalizing);

                let router = self.services.router.clone();
                let tx = self.internal_tx.clone();
                self.tasks.spawn(async move {
                    router.finish_recording(recording.temp, recording.writer).await;
                    let _ = tx.send(Internal::Routed {
                        window: id,
                        action: WindowAction::Close,
                    });
                });
                Ok(())
            }
            other => {
                log::warn!("Video overlay sent unexpected {:?}", other);
                Ok(())
            }
        }
    }

    async fn begin_recording(&mut self, chunks: ChunkReceiver) {
        if self.state.active.as_ref().is_some_and(|a| a.recording.is_some()) {
            log::warn!("Recording already running; ignoring second start");
            return;
        }

        match TempVideoFile::allocate(&self.services.config.temp_dir).await {
            Ok(temp) => {
                log::info!("Recording into {}", temp.path().display());
                let writer = spawn_chunk_writer(&temp, chunks);
                if let Some(active) = self.state.active.as_mut() {
                    active.recording = Some(PendingRecording { temp, writer });
                }
            }
            Err(e) => {
                // dropping `chunks` makes the recorder give up
                log::error!("Could not create recording file: {}", e);
                self.services
                    .notifier
                    .notify(&format!("Could not start recording: {}", e), Severity::Error);
            }
        }
    }
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        log::error!("Routing task failed: {}", e);
    }
}
