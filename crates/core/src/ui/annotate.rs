//! Annotation shapes and flattening.
//!
//! Shapes are kept as a list in physical frame pixels, each clipped to the
//! selection it was drawn in. Only the last [`UNDO_LIMIT`] stay undoable;
//! older ones are baked into a raster base. [`flatten`] replays everything
//! over a crop of the frame.

use crate::error::{AppError, Result};
use crate::geometry::{PixelRect, Point, Rect};
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;

pub const UNDO_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Move and resize the selection.
    Select,
    Pen,
    Rectangle,
    Ellipse,
    Arrow,
    Text,
    Pixelate,
}

impl Tool {
    pub const PALETTE: [Tool; 7] = [
        Tool::Select,
        Tool::Pen,
        Tool::Rectangle,
        Tool::Ellipse,
        Tool::Arrow,
        Tool::Text,
        Tool::Pixelate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Select => "Move",
            Tool::Pen => "Pen",
            Tool::Rectangle => "Rect",
            Tool::Ellipse => "Ellipse",
            Tool::Arrow => "Arrow",
            Tool::Text => "Text",
            Tool::Pixelate => "Blur",
        }
    }
}

/// Pixelation block edge in physical pixels for a display scale.
pub fn pixelate_block(scale: f32) -> u32 {
    ((10.0 * scale).floor() as u32).max(2)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Pen { points: Vec<(f32, f32)> },
    Rectangle { from: (f32, f32), to: (f32, f32) },
    Ellipse { from: (f32, f32), to: (f32, f32) },
    Arrow { from: (f32, f32), to: (f32, f32) },
    Text { origin: (f32, f32), text: String },
    Pixelate { from: (f32, f32), to: (f32, f32) },
}

/// A committed annotation in physical pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub color: Rgba<u8>,
    pub width: f32,
    /// Nothing outside this rectangle is touched.
    pub clip: PixelRect,
}

impl Shape {
    /// Builds a shape from logical points by scaling them into frame pixels.
    pub fn from_logical(kind: ShapeKind, color: Rgba<u8>, width: f32, selection: Rect, scale: f32) -> Self {
        let s = |(x, y): (f32, f32)| (x * scale, y * scale);
        let kind = match kind {
            ShapeKind::Pen { points } => ShapeKind::Pen {
                points: points.into_iter().map(s).collect(),
            },
            ShapeKind::Rectangle { from, to } => ShapeKind::Rectangle { from: s(from), to: s(to) },
            ShapeKind::Ellipse { from, to } => ShapeKind::Ellipse { from: s(from), to: s(to) },
            ShapeKind::Arrow { from, to } => ShapeKind::Arrow { from: s(from), to: s(to) },
            ShapeKind::Text { origin, text } => ShapeKind::Text { origin: s(origin), text },
            ShapeKind::Pixelate { from, to } => ShapeKind::Pixelate { from: s(from), to: s(to) },
        };
        Self {
            kind,
            color,
            width: (width * scale).max(1.0),
            clip: selection.to_physical(scale),
        }
    }
}

/// Committed annotations of one overlay.
#[derive(Debug, Clone)]
pub struct AnnotationLayer {
    scale: f32,
    base: Option<RgbaImage>,
    shapes: VecDeque<Shape>,
}

impl AnnotationLayer {
    pub fn new(scale: f32) -> Self {
        Self {
            scale,
            base: None,
            shapes: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.shapes.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.shapes.len()
    }

    /// Commits `shape`, baking the oldest one into `frame`-sized base if the undo stack is full.
    pub fn push(&mut self, shape: Shape, frame: &RgbaImage) {
        self.shapes.push_back(shape);
        while self.shapes.len() > UNDO_LIMIT {
            if let Some(oldest) = self.shapes.pop_front() {
                let (w, h) = frame.dimensions();
                let mut canvas = Canvas {
                    image: self.base.take().unwrap_or_else(|| RgbaImage::new(w, h)),
                    x: 0,
                    y: 0,
                };
                canvas.draw(&oldest, frame, self.scale);
                self.base = Some(canvas.image);
            }
        }
    }

    pub fn undo(&mut self) -> Option<Shape> {
        self.shapes.pop_back()
    }

    pub fn clear(&mut self) {
        self.base = None;
        self.shapes.clear();
    }

    /// Renders the layer for `region` into a transparent canvas of that size.
    fn render(&self, frame: &RgbaImage, region: PixelRect) -> Canvas {
        let mut canvas = Canvas {
            image: RgbaImage::new(region.width, region.height),
            x: region.x,
            y: region.y,
        };
        if let Some(base) = &self.base {
            image::imageops::replace(
                &mut canvas.image,
                &image::imageops::crop_imm(base, region.x, region.y, region.width, region.height).to_image(),
                0,
                0,
            );
        }
        for shape in &self.shapes {
            canvas.draw(shape, frame, self.scale);
        }
        canvas
    }
}

/// Crops `frame` to the logical `region` and composites the annotations over it.
///
/// With no annotations the result is exactly the crop of the frame.
pub fn flatten(frame: &RgbaImage, layer: &AnnotationLayer, region: Rect, scale: f32) -> Result<RgbaImage> {
    let px = region.to_physical(scale).clamp_to(frame.width(), frame.height());
    if px.is_empty() {
        return Err(AppError::image("selection lies outside the captured frame"));
    }

    let mut out = image::imageops::crop_imm(frame, px.x, px.y, px.width, px.height).to_image();
    if layer.is_empty() {
        return Ok(out);
    }

    let canvas = layer.render(frame, px);
    for (dst, src) in out.pixels_mut().zip(canvas.image.pixels()) {
        *dst = blend(*dst, *src);
    }
    Ok(out)
}

/// Source-over compositing of straight-alpha pixels.
pub fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as u32;
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let da = dst[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut px = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as u32 * sa + dst[c] as u32 * da * (255 - sa) / 255) / out_a;
        px[c] = v.min(255) as u8;
    }
    px[3] = out_a.min(255) as u8;
    Rgba(px)
}

/// A window onto frame coordinates starting at (`x`, `y`).
struct Canvas {
    image: RgbaImage,
    x: u32,
    y: u32,
}

impl Canvas {
    fn draw(&mut self, shape: &Shape, frame: &RgbaImage, scale: f32) {
        let radius = shape.width / 2.0;
        match &shape.kind {
            ShapeKind::Pen { points } => {
                if let [only] = points.as_slice() {
                    self.disc(*only, radius, shape.color, shape.clip);
                }
                for pair in points.windows(2) {
                    self.line(pair[0], pair[1], radius, shape.color, shape.clip);
                }
            }
            ShapeKind::Rectangle { from, to } => {
                let (a, b) = (*from, *to);
                let corners = [a, (b.0, a.1), b, (a.0, b.1), a];
                for pair in corners.windows(2) {
                    self.line(pair[0], pair[1], radius, shape.color, shape.clip);
                }
            }
            ShapeKind::Ellipse { from, to } => {
                let (cx, cy) = ((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
                let (rx, ry) = ((to.0 - from.0).abs() / 2.0, (to.1 - from.1).abs() / 2.0);
                let steps = ((rx + ry) * 0.5).clamp(24.0, 720.0) as usize;
                let point = |i: usize| {
                    let t = i as f32 / steps as f32 * std::f32::consts::TAU;
                    (cx + rx * t.cos(), cy + ry * t.sin())
                };
                for i in 0..steps {
                    self.line(point(i), point(i + 1), radius, shape.color, shape.clip);
                }
            }
            ShapeKind::Arrow { from, to } => {
                self.line(*from, *to, radius, shape.color, shape.clip);
                let (dx, dy) = (to.0 - from.0, to.1 - from.1);
                let len = (dx * dx + dy * dy).sqrt();
                if len > 0.0 {
                    let head = (shape.width * 4.0).max(10.0 * scale).min(len);
                    let angle = dy.atan2(dx);
                    for side in [-1.0f32, 1.0] {
                        let a = angle + std::f32::consts::PI - side * std::f32::consts::FRAC_PI_6;
                        let tip = (to.0 + head * a.cos(), to.1 + head * a.sin());
                        self.line(*to, tip, radius, shape.color, shape.clip);
                    }
                }
            }
            ShapeKind::Text { origin, text } => {
                let cell = (shape.width * 1.5).max(2.0 * scale).round().max(1.0) as u32;
                self.text(*origin, text, cell, shape.color, shape.clip);
            }
            ShapeKind::Pixelate { from, to } => {
                let area = Rect::from_corners(Point::new(from.0, from.1), Point::new(to.0, to.1))
                    .to_physical(1.0);
                self.pixelate(area, pixelate_block(scale), frame, shape.clip);
            }
        }
    }

    fn covers(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.image.width() && y - self.y < self.image.height()
    }

    fn visible(&self, x: u32, y: u32, clip: PixelRect) -> bool {
        x >= clip.x && y >= clip.y && x - clip.x < clip.width && y - clip.y < clip.height && self.covers(x, y)
    }

    fn put(&mut self, x: u32, y: u32, color: Rgba<u8>, clip: PixelRect) {
        if self.visible(x, y, clip) {
            let px = self.image.get_pixel_mut(x - self.x, y - self.y);
            *px = blend(*px, color);
        }
    }

    fn disc(&mut self, (cx, cy): (f32, f32), radius: f32, color: Rgba<u8>, clip: PixelRect) {
        let r = radius.max(0.5);
        let x0 = (cx - r).floor().max(0.0) as u32;
        let y0 = (cy - r).floor().max(0.0) as u32;
        let x1 = (cx + r).ceil().max(0.0) as u32;
        let y1 = (cy + r).ceil().max(0.0) as u32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                if dx * dx + dy * dy <= r * r {
                    self.put(x, y, color, clip);
                }
            }
        }
    }

    fn line(&mut self, a: (f32, f32), b: (f32, f32), radius: f32, color: Rgba<u8>, clip: PixelRect) {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let steps = ((dx * dx + dy * dy).sqrt() * 2.0).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.disc((a.0 + dx * t, a.1 + dy * t), radius, color, clip);
        }
    }

    fn text(&mut self, (ox, oy): (f32, f32), text: &str, cell: u32, color: Rgba<u8>, clip: PixelRect) {
        let (ox, oy) = (ox.max(0.0) as u32, oy.max(0.0) as u32);
        for (i, ch) in text.chars().enumerate() {
            let rows = glyph(ch);
            let gx = ox + i as u32 * (GLYPH_W + 1) * cell;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    let px = gx + col * cell;
                    let py = oy + row as u32 * cell;
                    for y in py..py + cell {
                        for x in px..px + cell {
                            self.put(x, y, color, clip);
                        }
                    }
                }
            }
        }
    }

    /// Averages `block`-sized cells of the frame with the annotations so far.
    fn pixelate(&mut self, area: PixelRect, block: u32, frame: &RgbaImage, clip: PixelRect) {
        let right = (area.x + area.width).min(frame.width());
        let bottom = (area.y + area.height).min(frame.height());
        let mut by = area.y;
        while by < bottom {
            let mut bx = area.x;
            while bx < right {
                let (ex, ey) = ((bx + block).min(right), (by + block).min(bottom));
                let mut sum = [0u64; 4];
                let mut n = 0u64;
                for y in by..ey {
                    for x in bx..ex {
                        let mut px = *frame.get_pixel(x, y);
                        if self.covers(x, y) {
                            px = blend(px, *self.image.get_pixel(x - self.x, y - self.y));
                        }
                        for c in 0..4 {
                            sum[c] += px[c] as u64;
                        }
                        n += 1;
                    }
                }
                if n > 0 {
                    let avg = Rgba([
                        (sum[0] / n) as u8,
                        (sum[1] / n) as u8,
                        (sum[2] / n) as u8,
                        255,
                    ]);
                    for y in by..ey {
                        for x in bx..ex {
                            if self.visible(x, y, clip) {
                                *self.image.get_pixel_mut(x - self.x, y - self.y) = avg;
                            }
                        }
                    }
                }
                bx += block;
            }
            by += block;
        }
    }
}

const GLYPH_W: u32 = 5;

/// 5x7 bitmap rows, most significant of the low five bits on the left.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        ' ' => [0x00; 7],
        // unknown characters render as a hollow box
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn frame() -> RgbaImage {
        RgbaImage::from_fn(400, 300, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]))
    }

    fn rect_shape(selection: Rect) -> Shape {
        Shape::from_logical(
            ShapeKind::Rectangle { from: (10.0, 10.0), to: (390.0, 290.0) },
            RED,
            2.0,
            selection,
            1.0,
        )
    }

    #[test]
    fn empty_layer_flattens_to_plain_crop() {
        let frame = frame();
        let out = flatten(&frame, &AnnotationLayer::new(1.0), Rect::new(40.0, 30.0, 200.0, 150.0), 1.0).unwrap();
        let direct = image::imageops::crop_imm(&frame, 40, 30, 200, 150).to_image();
        assert_eq!(out.as_raw(), direct.as_raw());
    }

    #[test]
    fn strokes_are_clipped_to_the_selection() {
        let frame = frame();
        let selection = Rect::new(100.0, 100.0, 100.0, 100.0);
        let mut layer = AnnotationLayer::new(1.0);
        layer.push(
            Shape::from_logical(
                ShapeKind::Pen { points: vec![(50.0, 150.0), (250.0, 150.0)] },
                RED,
                4.0,
                selection,
                1.0,
            ),
            &frame,
        );

        // a wider export shows the stroke only inside the original selection
        let out = flatten(&frame, &layer, Rect::new(0.0, 0.0, 400.0, 300.0), 1.0).unwrap();
        assert_eq!(*out.get_pixel(150, 150), RED);
        assert_eq!(out.get_pixel(60, 150), frame.get_pixel(60, 150));
        assert_eq!(out.get_pixel(240, 150), frame.get_pixel(240, 150));
    }

    #[test]
    fn undo_keeps_twenty_snapshots() {
        let frame = frame();
        let full = Rect::new(0.0, 0.0, 400.0, 300.0);
        let mut layer = AnnotationLayer::new(1.0);
        for _ in 0..25 {
            layer.push(rect_shape(full), &frame);
        }
        assert_eq!(layer.undo_depth(), UNDO_LIMIT);

        let mut undone = 0;
        while layer.undo().is_some() {
            undone += 1;
        }
        assert_eq!(undone, UNDO_LIMIT);
        // the five oldest were baked and stay visible
        assert!(!layer.is_empty());
        let out = flatten(&frame, &layer, full, 1.0).unwrap();
        assert_eq!(*out.get_pixel(200, 10), RED);
    }

    #[test]
    fn pixelate_averages_blocks() {
        let frame = RgbaImage::from_fn(40, 40, |x, _| {
            if x % 2 == 0 { Rgba([0, 0, 0, 255]) } else { Rgba([200, 200, 200, 255]) }
        });
        let full = Rect::new(0.0, 0.0, 40.0, 40.0);
        let mut layer = AnnotationLayer::new(1.0);
        layer.push(
            Shape::from_logical(
                ShapeKind::Pixelate { from: (0.0, 0.0), to: (20.0, 20.0) },
                RED,
                1.0,
                full,
                1.0,
            ),
            &frame,
        );
        let out = flatten(&frame, &layer, full, 1.0).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([100, 100, 100, 255]));
        assert_eq!(*out.get_pixel(1, 5), Rgba([100, 100, 100, 255]));
        assert_eq!(out.get_pixel(30, 30), frame.get_pixel(30, 30));
    }

    #[test]
    fn pixelate_block_scales_with_display() {
        assert_eq!(pixelate_block(1.0), 10);
        assert_eq!(pixelate_block(1.5), 15);
        assert_eq!(pixelate_block(0.1), 2);
    }

    #[test]
    fn text_stamp_marks_pixels() {
        let frame = frame();
        let full = Rect::new(0.0, 0.0, 400.0, 300.0);
        let mut layer = AnnotationLayer::new(1.0);
        layer.push(
            Shape::from_logical(
                ShapeKind::Text { origin: (20.0, 20.0), text: "HI".into() },
                RED,
                2.0,
                full,
                1.0,
            ),
            &frame,
        );
        let out = flatten(&frame, &layer, full, 1.0).unwrap();
        // top-left pixel of 'H' is set, the gap between its bars is not
        assert_eq!(*out.get_pixel(20, 20), RED);
        assert_eq!(out.get_pixel(24, 20), frame.get_pixel(24, 20));
    }

    #[test]
    fn translucent_over_opaque_stays_opaque() {
        let mixed = blend(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(mixed[3], 255);
        assert!(mixed[0] > 120 && mixed[0] < 135);
    }
}
