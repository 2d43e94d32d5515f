//! The egui overlay surfaces.
//!
//! One [`OverlayApp`] runs per window. It reports `Loaded` on its first
//! update, waits for the frame, reports `Ready` once the frame is uploaded
//! and paints nothing until told to `Show`. Escape always closes.

use super::annotate::{flatten, AnnotationLayer, Shape, ShapeKind, Tool};
use super::rendering::{
    color_image, paint_backdrop, paint_border, paint_handles, paint_preview, paint_size_label, point,
    to_egui, to_rgba, toolbar_position, ACCENT, DIM_ALPHA, RECORDING,
};
use super::selection::{SelectionEvent, SelectionTool};
use super::state::{DrawSurface, OcrSurface, Recording, Stage, Stroke, Surface, VideoSurface};
use super::{FramePayload, OverlayCommand, OverlayEvent, OverlayEventSender, OverlayMessage, WindowId};
use crate::capture::PointerTracker;
use crate::error::{AppError, Result};
use crate::geometry::{Point, Rect, SelectionRegion, MIN_SELECTION_SIZE};
use crate::image_processing::ImageProcessor;
use crate::mode::CaptureMode;
use crate::recording::{chunk_channel, RecordingRequest, ScreenRecorder};
use eframe::egui;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(33);
const TOOLBAR_GAP: f32 = 10.0;
/// Margin around the recording toolbar that still takes clicks.
const TOOLBAR_REACH: f32 = 20.0;
const VIDEO_MIN_RESIZE: f32 = 50.0;
const PRESET_SIZE: (f32, f32) = (1280.0, 720.0);

/// Sending half of the window's link to the session.
struct Link {
    id: WindowId,
    events: OverlayEventSender,
}

impl Link {
    fn emit(&self, event: OverlayEvent) {
        if self.events.send(event).is_err() {
            log::debug!("{}: session no longer listening", self.id);
        }
    }

    fn message(&self, message: OverlayMessage) {
        log::debug!("{} -> {:?}", self.id, message);
        self.emit(OverlayEvent::Message(self.id, message));
    }
}

/// Frame-dependent state, created on `Deliver`.
struct Scene {
    payload: FramePayload,
    texture: egui::TextureHandle,
    surface: Surface,
}

pub(crate) struct OverlayApp {
    link: Link,
    mode: CaptureMode,
    commands: Receiver<OverlayCommand>,
    pointer: PointerTracker,
    stage: Stage,
    scene: Option<Scene>,
    announced: bool,
    closing: bool,
}

impl OverlayApp {
    pub(crate) fn new(
        id: WindowId,
        mode: CaptureMode,
        commands: Receiver<OverlayCommand>,
        events: OverlayEventSender,
        pointer: PointerTracker,
    ) -> Self {
        Self {
            link: Link { id, events },
            mode,
            commands,
            pointer,
            stage: Stage::Loading,
            scene: None,
            announced: false,
            closing: false,
        }
    }

    fn close(&mut self, ctx: &egui::Context) {
        if !self.closing {
            self.closing = true;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn process_commands(&mut self, ctx: &egui::Context) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                OverlayCommand::Deliver(payload) => self.accept(ctx, payload),
                OverlayCommand::Show => {
                    self.stage = Stage::Shown;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                }
                OverlayCommand::Hide => {
                    self.stage = Stage::Hidden;
                    ctx.send_viewport_cmd(egui::ViewportCommand::MousePassthrough(true));
                }
                OverlayCommand::SetAlwaysOnTop(on) => {
                    let level = if on {
                        egui::WindowLevel::AlwaysOnTop
                    } else {
                        egui::WindowLevel::Normal
                    };
                    ctx.send_viewport_cmd(egui::ViewportCommand::WindowLevel(level));
                    if let Some(Scene { surface: Surface::Draw(draw), .. }) = &mut self.scene {
                        // back on top after a save prompt
                        draw.busy &= !on;
                    }
                }
                OverlayCommand::SetMousePassthrough(on) => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::MousePassthrough(on));
                }
                OverlayCommand::Close => self.close(ctx),
            }
        }
    }

    fn accept(&mut self, ctx: &egui::Context, payload: FramePayload) {
        if self.scene.is_some() {
            log::warn!("{}: frame delivered twice, ignoring", self.link.id);
            return;
        }
        if payload.mode != self.mode {
            log::warn!("{}: opened for {} but got a {} frame", self.link.id, self.mode, payload.mode);
        }

        let rgba = payload.frame.to_rgba8();
        let texture = ctx.load_texture("frame", color_image(&rgba), egui::TextureOptions::LINEAR);
        let bounds = Rect::new(0.0, 0.0, payload.bounds.width, payload.bounds.height);

        let surface = match payload.mode {
            CaptureMode::Draw => Surface::Draw(DrawSurface {
                selection: SelectionTool::new(bounds, MIN_SELECTION_SIZE * 2.0),
                frame: rgba,
                layer: AnnotationLayer::new(payload.scale_factor),
                tool: Tool::Select,
                color: egui::Color32::RED,
                width: 3.0,
                text: String::new(),
                stroke: None,
                composite: None,
                composite_dirty: false,
                toolbar: None,
                busy: false,
            }),
            CaptureMode::Ocr => Surface::Ocr(OcrSurface {
                selection: SelectionTool::new(bounds, MIN_SELECTION_SIZE * 2.0),
                sent: false,
            }),
            CaptureMode::Video => Surface::Video(VideoSurface {
                selection: SelectionTool::new(bounds, VIDEO_MIN_RESIZE),
                recording: Recording::Selecting,
                error: None,
                passthrough: false,
                toolbar: None,
            }),
        };

        self.scene = Some(Scene {
            payload,
            texture,
            surface,
        });
        self.stage = Stage::Delivered;
        self.link.emit(OverlayEvent::Ready(self.link.id));
    }
}

impl eframe::App for OverlayApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        [0.0, 0.0, 0.0, 0.0]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.close(ctx);
            return;
        }

        if !self.announced {
            self.announced = true;
            self.link.emit(OverlayEvent::Loaded(self.link.id));
        }
        self.process_commands(ctx);
        ctx.request_repaint_after(POLL_INTERVAL);

        let shown = self.stage == Stage::Shown;
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let Some(scene) = self.scene.as_mut().filter(|_| shown) else {
                    return;
                };
                let screen = ui.max_rect();
                match &mut scene.surface {
                    Surface::Draw(draw) => draw_ui(ui, screen, draw, &scene.payload, &scene.texture, &self.link),
                    Surface::Ocr(ocr) => ocr_ui(ui, screen, ocr, &scene.payload, &scene.texture, &self.link),
                    Surface::Video(video) => video_ui(
                        ui,
                        screen,
                        video,
                        &scene.payload,
                        &scene.texture,
                        &self.link,
                        &self.pointer,
                    ),
                }
            });
    }
}

fn paint_frame(ui: &egui::Ui, screen: egui::Rect, texture: &egui::TextureHandle) {
    ui.painter().image(
        texture.id(),
        screen,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );
}

fn hint(ui: &egui::Ui, screen: egui::Rect, text: &str) {
    ui.painter().text(
        egui::pos2(screen.center().x, screen.min.y + 40.0),
        egui::Align2::CENTER_CENTER,
        text,
        egui::FontId::proportional(18.0),
        egui::Color32::WHITE,
    );
}

/// Shows `add_contents` in a floating bar next to `anchor` and returns the bar's rect.
fn toolbar(
    ctx: &egui::Context,
    name: &str,
    anchor: egui::Rect,
    screen: egui::Rect,
    last: Option<egui::Rect>,
    add_contents: impl FnOnce(&mut egui::Ui),
) -> egui::Rect {
    let size = last.map_or(egui::vec2(320.0, 36.0), |r| r.size());
    egui::Area::new(egui::Id::new(name))
        .fixed_pos(toolbar_position(anchor, screen, size, TOOLBAR_GAP))
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style())
                .fill(egui::Color32::from_rgb(30, 30, 30))
                .stroke(egui::Stroke::new(1.0, egui::Color32::GRAY))
                .inner_margin(6.0)
                .show(ui, |ui| ui.horizontal(add_contents));
        })
        .response
        .rect
}

fn draw_ui(
    ui: &mut egui::Ui,
    screen: egui::Rect,
    draw: &mut DrawSurface,
    payload: &FramePayload,
    texture: &egui::TextureHandle,
    link: &Link,
) {
    let scale = payload.scale_factor;
    paint_frame(ui, screen, texture);

    let response = ui.interact(screen, ui.id().with("draw"), egui::Sense::click_and_drag());
    if !draw.busy {
        handle_draw_input(draw, &response, scale);
    }

    if draw.composite_dirty {
        draw.composite_dirty = false;
        draw.composite = match draw.selection.region() {
            Some(region) if !draw.layer.is_empty() => {
                match flatten(&draw.frame, &draw.layer, region.rect(), scale) {
                    Ok(image) => Some(ui.ctx().load_texture(
                        "annotations",
                        color_image(&image),
                        egui::TextureOptions::LINEAR,
                    )),
                    Err(e) => {
                        log::warn!("Annotation preview failed: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };
    }

    let visible = draw.selection.visible_rect();
    paint_backdrop(ui.painter(), screen, visible.map(to_egui), DIM_ALPHA);
    let Some(rect) = visible else {
        hint(ui, screen, "Drag to select an area");
        return;
    };
    let selection = to_egui(rect);

    if let (Some(composite), false) = (&draw.composite, draw.selection.is_dragging()) {
        ui.painter().image(
            composite.id(),
            selection,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }
    if let Some(stroke) = &draw.stroke {
        let painter = ui.painter().with_clip_rect(selection);
        paint_preview(&painter, &stroke.kind, draw.color, draw.width);
    }
    paint_border(ui.painter(), selection, ACCENT);
    paint_size_label(ui.painter(), selection, scale);
    if draw.tool == Tool::Select {
        paint_handles(ui.painter(), rect);
    }

    if draw.selection.is_dragging() || draw.selection.region().is_none() {
        return;
    }

    let mut action = None;
    let undo_enabled = draw.layer.undo_depth() > 0;
    let bar = toolbar(ui.ctx(), "draw_toolbar", selection, screen, draw.toolbar, |ui| {
        ui.add_enabled_ui(!draw.busy, |ui| {
            for tool in Tool::PALETTE {
                ui.selectable_value(&mut draw.tool, tool, tool.label());
            }
            ui.separator();
            ui.color_edit_button_srgba(&mut draw.color);
            ui.add(egui::Slider::new(&mut draw.width, 1.0..=12.0).show_value(false));
            if draw.tool == Tool::Text {
                ui.add(
                    egui::TextEdit::singleline(&mut draw.text)
                        .desired_width(120.0)
                        .hint_text("Text, then click"),
                );
            }
            ui.separator();
            if ui.add_enabled(undo_enabled, egui::Button::new("Undo")).clicked() {
                action = Some(DrawAction::Undo);
            }
            if ui.button("Copy").clicked() {
                action = Some(DrawAction::Copy);
            }
            if ui.button("Save").clicked() {
                action = Some(DrawAction::Save);
            }
            if ui.button("Close").clicked() {
                action = Some(DrawAction::Close);
            }
        });
    });
    draw.toolbar = Some(bar);

    match action {
        Some(DrawAction::Undo) => {
            draw.layer.undo();
            draw.composite_dirty = true;
        }
        Some(DrawAction::Copy) => export(draw, scale, link, OverlayMessage::CopyImage),
        Some(DrawAction::Save) => export(draw, scale, link, OverlayMessage::SaveImage),
        Some(DrawAction::Close) => link.message(OverlayMessage::CloseRequested),
        None => {}
    }
}

#[derive(Debug, Clone, Copy)]
enum DrawAction {
    Undo,
    Copy,
    Save,
    Close,
}

fn handle_draw_input(draw: &mut DrawSurface, response: &egui::Response, scale: f32) {
    let Some(pos) = response.interact_pointer_pos().map(point) else {
        return;
    };
    let inside = draw
        .selection
        .region()
        .is_some_and(|r| r.rect().contains(pos));

    if draw.tool == Tool::Text && response.clicked() {
        if inside && !draw.text.trim().is_empty() {
            let kind = ShapeKind::Text {
                origin: (pos.x, pos.y),
                text: draw.text.clone(),
            };
            commit(draw, kind, scale);
        }
        return;
    }

    if response.drag_started() && inside {
        draw.stroke = begin_stroke(draw.tool, pos).map(|kind| Stroke { start: pos, kind });
    }

    match draw.stroke.as_mut() {
        Some(stroke) => {
            if response.dragged() {
                extend_stroke(&mut stroke.kind, pos);
            }
            if response.drag_stopped() {
                let Stroke { start, kind } = stroke.clone();
                draw.stroke = None;
                if start != pos || matches!(kind, ShapeKind::Pen { .. }) {
                    commit(draw, kind, scale);
                }
            }
        }
        None => match draw.selection.handle_response(response) {
            SelectionEvent::Completed | SelectionEvent::Adjusted => draw.composite_dirty = true,
            SelectionEvent::Started | SelectionEvent::Cancelled => {
                draw.layer.clear();
                draw.composite_dirty = true;
            }
            SelectionEvent::Dragging | SelectionEvent::None => {}
        },
    }
}

fn begin_stroke(tool: Tool, p: Point) -> Option<ShapeKind> {
    let at = (p.x, p.y);
    match tool {
        Tool::Select | Tool::Text => None,
        Tool::Pen => Some(ShapeKind::Pen { points: vec![at] }),
        Tool::Rectangle => Some(ShapeKind::Rectangle { from: at, to: at }),
        Tool::Ellipse => Some(ShapeKind::Ellipse { from: at, to: at }),
        Tool::Arrow => Some(ShapeKind::Arrow { from: at, to: at }),
        Tool::Pixelate => Some(ShapeKind::Pixelate { from: at, to: at }),
    }
}

fn extend_stroke(kind: &mut ShapeKind, p: Point) {
    let at = (p.x, p.y);
    match kind {
        ShapeKind::Pen { points } => points.push(at),
        ShapeKind::Rectangle { to, .. }
        | ShapeKind::Ellipse { to, .. }
        | ShapeKind::Arrow { to, .. }
        | ShapeKind::Pixelate { to, .. } => *to = at,
        ShapeKind::Text { .. } => {}
    }
}

fn commit(draw: &mut DrawSurface, kind: ShapeKind, scale: f32) {
    let Some(region) = draw.selection.region() else {
        return;
    };
    let shape = Shape::from_logical(kind, to_rgba(draw.color), draw.width, region.rect(), scale);
    draw.layer.push(shape, &draw.frame);
    draw.composite_dirty = true;
}

fn export(draw: &mut DrawSurface, scale: f32, link: &Link, wrap: fn(Vec<u8>) -> OverlayMessage) {
    let encoded = draw
        .selection
        .region()
        .ok_or_else(|| AppError::ui("nothing selected"))
        .and_then(|region| flatten(&draw.frame, &draw.layer, region.rect(), scale))
        .and_then(|image| ImageProcessor::encode_png(&image));
    match encoded {
        Ok(png) => {
            draw.busy = true;
            link.message(wrap(png));
        }
        Err(e) => log::error!("Export failed: {}", e),
    }
}

fn ocr_ui(
    ui: &mut egui::Ui,
    screen: egui::Rect,
    ocr: &mut OcrSurface,
    payload: &FramePayload,
    texture: &egui::TextureHandle,
    link: &Link,
) {
    paint_frame(ui, screen, texture);

    let response = ui.interact(screen, ui.id().with("ocr"), egui::Sense::drag());
    if !ocr.sent && ocr.selection.handle_response(&response) == SelectionEvent::Completed {
        if let Some(region) = ocr.selection.region() {
            match crop_png(payload, region.rect()) {
                Ok(png) => {
                    ocr.sent = true;
                    ocr.selection.set_locked(true);
                    link.message(OverlayMessage::OcrRequest(png));
                }
                Err(e) => log::error!("OCR crop failed: {}", e),
            }
        }
    }

    let visible = ocr.selection.visible_rect();
    paint_backdrop(ui.painter(), screen, visible.map(to_egui), DIM_ALPHA);
    match visible {
        Some(rect) => paint_border(ui.painter(), to_egui(rect), ACCENT),
        None => hint(ui, screen, "Drag over the text to copy"),
    }
}

fn crop_png(payload: &FramePayload, rect: Rect) -> Result<Vec<u8>> {
    let crop = ImageProcessor::crop_selection(&payload.frame, rect, payload.scale_factor)?;
    ImageProcessor::encode_png(&crop)
}

#[derive(Debug, Clone, Copy)]
enum VideoAction {
    Fullscreen,
    Preset,
    Start,
    Stop,
    Cancel,
}

fn video_ui(
    ui: &mut egui::Ui,
    screen: egui::Rect,
    video: &mut VideoSurface,
    payload: &FramePayload,
    texture: &egui::TextureHandle,
    link: &Link,
    pointer: &PointerTracker,
) {
    let mut action = None;

    match video.recording {
        Recording::Selecting => {
            paint_frame(ui, screen, texture);
            let response = ui.interact(screen, ui.id().with("video"), egui::Sense::drag());
            video.selection.handle_response(&response);

            let visible = video.selection.visible_rect();
            paint_backdrop(ui.painter(), screen, visible.map(to_egui), DIM_ALPHA);
            if let Some(rect) = visible {
                paint_border(ui.painter(), to_egui(rect), ACCENT);
                paint_size_label(ui.painter(), to_egui(rect), payload.scale_factor);
                paint_handles(ui.painter(), rect);
            } else {
                hint(ui, screen, "Drag to choose the recording area");
            }

            if !video.selection.is_dragging() {
                let anchor = visible.map(to_egui).unwrap_or_else(|| {
                    egui::Rect::from_center_size(
                        egui::pos2(screen.center().x, screen.min.y + 40.0),
                        egui::vec2(0.0, 0.0),
                    )
                });
                let has_region = video.selection.region().is_some();
                let error = video.error.clone();
                video.toolbar = Some(toolbar(ui.ctx(), "video_toolbar", anchor, screen, video.toolbar, |ui| {
                    if ui.add_enabled(has_region, egui::Button::new("Record")).clicked() {
                        action = Some(VideoAction::Start);
                    }
                    if ui.button("Fullscreen").clicked() {
                        action = Some(VideoAction::Fullscreen);
                    }
                    if ui.button("1280x720").clicked() {
                        action = Some(VideoAction::Preset);
                    }
                    if ui.button("Cancel").clicked() {
                        action = Some(VideoAction::Cancel);
                    }
                    if let Some(error) = error {
                        ui.colored_label(RECORDING, error);
                    }
                }));
            }
        }
        Recording::Live { started, .. } => {
            if let Some(region) = video.selection.region() {
                let rect = to_egui(region.rect()).expand(2.0);
                paint_border(ui.painter(), rect, RECORDING);

                let secs = started.elapsed().as_secs();
                video.toolbar = Some(toolbar(ui.ctx(), "record_toolbar", rect, screen, video.toolbar, |ui| {
                    ui.colored_label(RECORDING, format!("REC {:02}:{:02}", secs / 60, secs % 60));
                    if ui.button("Stop").clicked() {
                        action = Some(VideoAction::Stop);
                    }
                }));
            }
            update_passthrough(video, payload, link, pointer);
        }
        Recording::Stopping => {
            hint(ui, screen, "Finishing recording...");
        }
    }

    match action {
        Some(VideoAction::Fullscreen) => {
            video
                .selection
                .set_region(SelectionRegion::full(screen.width(), screen.height()));
        }
        Some(VideoAction::Preset) => {
            let (w, h) = (PRESET_SIZE.0.min(screen.width()), PRESET_SIZE.1.min(screen.height()));
            let centred = Rect::new((screen.width() - w) / 2.0, (screen.height() - h) / 2.0, w, h);
            match SelectionRegion::from_rect(centred) {
                Ok(region) => video.selection.set_region(region),
                Err(e) => video.error = Some(e.to_string()),
            }
        }
        Some(VideoAction::Start) => start_recording(video, payload, link),
        Some(VideoAction::Stop) => stop_recording(video, link),
        Some(VideoAction::Cancel) => link.message(OverlayMessage::CloseRequested),
        None => {}
    }
}

/// Lets clicks through everywhere except near the recording toolbar.
fn update_passthrough(video: &mut VideoSurface, payload: &FramePayload, link: &Link, pointer: &PointerTracker) {
    let Some(bar) = video.toolbar else {
        return;
    };
    let global = pointer.position();
    let local = egui::pos2(global.x - payload.bounds.x, global.y - payload.bounds.y);
    let wanted = !bar.expand(TOOLBAR_REACH).contains(local);
    if wanted != video.passthrough {
        video.passthrough = wanted;
        link.message(OverlayMessage::SetMousePassthrough(wanted));
    }
}

fn start_recording(video: &mut VideoSurface, payload: &FramePayload, link: &Link) {
    let Some(region) = video.selection.region() else {
        return;
    };
    let Some(display_id) = payload.source.display_id() else {
        video.error = Some(format!("{} is not a display", payload.source));
        return;
    };

    let request = RecordingRequest {
        display_id,
        area: region.rect(),
        scale_factor: payload.scale_factor,
        quality: payload.video_quality,
        ffmpeg: payload.ffmpeg.clone(),
    };
    let (chunks_tx, chunks_rx) = chunk_channel();
    match ScreenRecorder::start(request, chunks_tx) {
        Ok(recorder) => {
            video.selection.set_locked(true);
            video.recording = Recording::Live {
                recorder,
                started: Instant::now(),
            };
            video.error = None;
            video.passthrough = false;
            link.message(OverlayMessage::RecordStart { chunks: chunks_rx });
        }
        Err(e) => {
            log::error!("Could not start recording: {}", e);
            video.error = Some(e.to_string());
        }
    }
}

/// Stops the recorder off the UI thread; `RecordStop` follows once the stream is flushed.
fn stop_recording(video: &mut VideoSurface, link: &Link) {
    let Recording::Live { recorder, .. } = std::mem::replace(&mut video.recording, Recording::Stopping) else {
        return;
    };
    let id = link.id;
    let events = link.events.clone();
    thread::spawn(move || {
        if let Err(e) = recorder.stop() {
            log::error!("{}: recorder stopped with error: {}", id, e);
        }
        let _ = events.send(OverlayEvent::Message(id, OverlayMessage::RecordStop));
    });
}
