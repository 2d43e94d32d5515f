//! Painting helpers shared by the overlay surfaces.

use super::annotate::ShapeKind;
use crate::geometry::{Handle, Point, Rect};
use eframe::egui;
use image::Rgba;

pub const DIM_ALPHA: u8 = 120;
pub const HANDLE_SIZE: f32 = 8.0;
pub const ACCENT: egui::Color32 = egui::Color32::from_rgb(0, 153, 255);
pub const RECORDING: egui::Color32 = egui::Color32::from_rgb(230, 40, 40);

pub fn to_egui(rect: Rect) -> egui::Rect {
    egui::Rect::from_min_size(egui::pos2(rect.x, rect.y), egui::vec2(rect.width, rect.height))
}

pub fn from_egui(rect: egui::Rect) -> Rect {
    Rect::new(rect.min.x, rect.min.y, rect.width(), rect.height())
}

pub fn point(pos: egui::Pos2) -> Point {
    Point::new(pos.x, pos.y)
}

pub fn pos(p: Point) -> egui::Pos2 {
    egui::pos2(p.x, p.y)
}

pub fn to_rgba(color: egui::Color32) -> Rgba<u8> {
    Rgba(color.to_srgba_unmultiplied())
}

pub fn color_image(image: &image::RgbaImage) -> egui::ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}

/// Dims everything outside `selection`; with no selection the whole screen is dimmed.
///
/// The four bands around the cutout are painted separately so the selected
/// pixels are left untouched.
pub fn paint_backdrop(painter: &egui::Painter, screen: egui::Rect, selection: Option<egui::Rect>, alpha: u8) {
    let shade = egui::Color32::from_black_alpha(alpha);
    let Some(cut) = selection.map(|s| s.intersect(screen)) else {
        painter.rect_filled(screen, 0.0, shade);
        return;
    };

    let bands = [
        egui::Rect::from_min_max(screen.min, egui::pos2(screen.max.x, cut.min.y)),
        egui::Rect::from_min_max(egui::pos2(screen.min.x, cut.max.y), screen.max),
        egui::Rect::from_min_max(egui::pos2(screen.min.x, cut.min.y), egui::pos2(cut.min.x, cut.max.y)),
        egui::Rect::from_min_max(egui::pos2(cut.max.x, cut.min.y), egui::pos2(screen.max.x, cut.max.y)),
    ];
    for band in bands {
        if band.is_positive() {
            painter.rect_filled(band, 0.0, shade);
        }
    }
}

pub fn paint_border(painter: &egui::Painter, selection: egui::Rect, color: egui::Color32) {
    painter.rect_stroke(
        selection,
        0.0,
        egui::Stroke::new(2.0, color),
        egui::StrokeKind::Outside,
    );
}

pub fn paint_handles(painter: &egui::Painter, selection: Rect) {
    for handle in Handle::ALL {
        let center = pos(handle.anchor(selection));
        let square = egui::Rect::from_center_size(center, egui::vec2(HANDLE_SIZE, HANDLE_SIZE));
        painter.rect_filled(square, 1.0, egui::Color32::WHITE);
        painter.rect_stroke(square, 1.0, egui::Stroke::new(1.0, ACCENT), egui::StrokeKind::Inside);
    }
}

/// Size label above the selection's top-left corner, in physical pixels.
pub fn paint_size_label(painter: &egui::Painter, selection: egui::Rect, scale: f32) {
    let text = format!(
        "{} x {}",
        (selection.width() * scale).round() as u32,
        (selection.height() * scale).round() as u32
    );
    let anchor = selection.min - egui::vec2(0.0, 6.0);
    painter.text(
        anchor,
        egui::Align2::LEFT_BOTTOM,
        text,
        egui::FontId::monospace(12.0),
        egui::Color32::WHITE,
    );
}

/// Live preview of a shape still being drawn, in logical points.
pub fn paint_preview(painter: &egui::Painter, kind: &ShapeKind, color: egui::Color32, width: f32) {
    let stroke = egui::Stroke::new(width, color);
    let p = |(x, y): (f32, f32)| egui::pos2(x, y);
    match kind {
        ShapeKind::Pen { points } => {
            painter.add(egui::Shape::line(points.iter().copied().map(p).collect(), stroke));
        }
        ShapeKind::Rectangle { from, to } => {
            painter.rect_stroke(
                egui::Rect::from_two_pos(p(*from), p(*to)),
                0.0,
                stroke,
                egui::StrokeKind::Middle,
            );
        }
        ShapeKind::Ellipse { from, to } => {
            let r = egui::Rect::from_two_pos(p(*from), p(*to));
            painter.add(egui::Shape::ellipse_stroke(r.center(), r.size() / 2.0, stroke));
        }
        ShapeKind::Arrow { from, to } => {
            painter.arrow(p(*from), p(*to) - p(*from), stroke);
        }
        ShapeKind::Text { origin, text } => {
            painter.text(
                p(*origin),
                egui::Align2::LEFT_TOP,
                text,
                egui::FontId::monospace(width * 7.0),
                color,
            );
        }
        ShapeKind::Pixelate { from, to } => {
            let r = egui::Rect::from_two_pos(p(*from), p(*to));
            painter.rect_filled(r, 0.0, egui::Color32::from_gray(128).gamma_multiply(0.5));
            painter.rect_stroke(r, 0.0, egui::Stroke::new(1.0, egui::Color32::WHITE), egui::StrokeKind::Middle);
        }
    }
}

/// Where a toolbar of `size` goes: below the selection, or above it when
/// there is no room below, kept on screen horizontally.
pub fn toolbar_position(selection: egui::Rect, screen: egui::Rect, size: egui::Vec2, gap: f32) -> egui::Pos2 {
    let x = (selection.center().x - size.x / 2.0)
        .clamp(screen.min.x + gap, (screen.max.x - size.x - gap).max(screen.min.x + gap));

    let below = selection.max.y + gap;
    let y = if below + size.y <= screen.max.y {
        below
    } else if selection.min.y - gap - size.y >= screen.min.y {
        selection.min.y - gap - size.y
    } else {
        // selection fills the screen; sit inside its bottom edge
        selection.max.y - gap - size.y
    };
    egui::pos2(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolbar_flips_above_when_no_room_below() {
        let screen = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(1000.0, 800.0));
        let size = egui::vec2(300.0, 40.0);

        let low = egui::Rect::from_min_size(egui::pos2(100.0, 100.0), egui::vec2(200.0, 200.0));
        assert_eq!(toolbar_position(low, screen, size, 10.0), egui::pos2(50.0, 310.0));

        let bottom = egui::Rect::from_min_size(egui::pos2(500.0, 600.0), egui::vec2(200.0, 190.0));
        assert_eq!(toolbar_position(bottom, screen, size, 10.0).y, 550.0);

        let full = screen;
        assert_eq!(toolbar_position(full, screen, size, 10.0).y, 750.0);
    }

    #[test]
    fn rect_conversion_roundtrips() {
        let r = Rect::new(5.0, 6.0, 70.0, 80.0);
        assert_eq!(from_egui(to_egui(r)), r);
    }
}
