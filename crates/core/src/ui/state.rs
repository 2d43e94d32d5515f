//! Overlay surface state.
//!
//! `Stage` follows the ready handshake: the window exists (`Loading`), gets
//! its frame (`Delivered`), confirms it painted (`Shown`) and may be hidden
//! again before closing. Each capture mode keeps its own surface state.

use super::annotate::{AnnotationLayer, ShapeKind, Tool};
use super::selection::SelectionTool;
use crate::geometry::Point;
use crate::recording::ScreenRecorder;
use eframe::egui;
use image::RgbaImage;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Loading,
    /// Frame uploaded and `Ready` sent; nothing painted until `Show`.
    Delivered,
    Shown,
    Hidden,
}

/// A shape the pointer is still drawing.
#[derive(Debug, Clone)]
pub(crate) struct Stroke {
    pub start: Point,
    pub kind: ShapeKind,
}

pub(crate) struct DrawSurface {
    pub selection: SelectionTool,
    pub frame: RgbaImage,
    pub layer: AnnotationLayer,
    pub tool: Tool,
    pub color: egui::Color32,
    pub width: f32,
    pub text: String,
    pub stroke: Option<Stroke>,
    /// Selection plus annotations, re-rendered after every change.
    pub composite: Option<egui::TextureHandle>,
    pub composite_dirty: bool,
    pub toolbar: Option<egui::Rect>,
    /// Export in flight; input is ignored until the window closes or reopens.
    pub busy: bool,
}

pub(crate) struct OcrSurface {
    pub selection: SelectionTool,
    pub sent: bool,
}

pub(crate) enum Recording {
    Selecting,
    Live {
        recorder: ScreenRecorder,
        started: Instant,
    },
    Stopping,
}

pub(crate) struct VideoSurface {
    pub selection: SelectionTool,
    pub recording: Recording,
    pub error: Option<String>,
    /// Current passthrough while recording; only changes are sent.
    pub passthrough: bool,
    pub toolbar: Option<egui::Rect>,
}

pub(crate) enum Surface {
    Draw(DrawSurface),
    Ocr(OcrSurface),
    Video(VideoSurface),
}
