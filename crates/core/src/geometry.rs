//! Logical/physical coordinate types and the selection region.
//!
//! Overlays work in the display's logical coordinate space. Captured frames
//! are in physical pixels, so every crop goes through [`Rect::to_physical`].

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Minimum width and height of a freshly dragged selection.
pub const MIN_SELECTION_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds the rectangle spanned by two corners, whichever way the drag went.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Grows the rectangle by `pad` on every side.
    pub fn expand(&self, pad: f32) -> Self {
        Self::new(self.x - pad, self.y - pad, self.width + pad * 2.0, self.height + pad * 2.0)
    }

    /// Squared distance from `p` to the closest point of the rectangle (0 inside).
    pub fn distance_sq(&self, p: Point) -> f32 {
        let dx = (self.x - p.x).max(0.0).max(p.x - self.right());
        let dy = (self.y - p.y).max(0.0).max(p.y - self.bottom());
        dx * dx + dy * dy
    }

    /// Converts logical coordinates to whole physical pixels.
    pub fn to_physical(&self, scale: f32) -> PixelRect {
        let x = (self.x * scale).round().max(0.0) as u32;
        let y = (self.y * scale).round().max(0.0) as u32;
        PixelRect {
            x,
            y,
            width: (self.width * scale).round().max(0.0) as u32,
            height: (self.height * scale).round().max(0.0) as u32,
        }
    }
}

/// Rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Clamps the rectangle into a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Physical pixel size of a display, rounded up so high-DPI thumbnails are never blurry.
pub fn physical_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        (width as f32 * scale).ceil() as u32,
        (height as f32 * scale).ceil() as u32,
    )
}

/// A validated selection inside an overlay surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRegion {
    rect: Rect,
}

impl SelectionRegion {
    /// Validates a dragged rectangle; anything under 10x10 is rejected.
    pub fn from_drag(start: Point, end: Point) -> Result<Self> {
        Self::from_rect(Rect::from_corners(start, end))
    }

    pub fn from_rect(rect: Rect) -> Result<Self> {
        if rect.width < MIN_SELECTION_SIZE || rect.height < MIN_SELECTION_SIZE {
            return Err(AppError::InvalidSelection {
                width: rect.width,
                height: rect.height,
            });
        }
        Ok(Self { rect })
    }

    /// Selection covering a whole surface.
    pub fn full(bounds_width: f32, bounds_height: f32) -> Self {
        Self {
            rect: Rect::new(0.0, 0.0, bounds_width, bounds_height),
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Moves the selection by `(dx, dy)` keeping it inside `surface`.
    pub fn translated(&self, dx: f32, dy: f32, surface: Rect) -> Self {
        let r = self.rect;
        let x = (r.x + dx).clamp(surface.x, (surface.right() - r.width).max(surface.x));
        let y = (r.y + dy).clamp(surface.y, (surface.bottom() - r.height).max(surface.y));
        Self {
            rect: Rect::new(x, y, r.width, r.height),
        }
    }

    /// Drags one edge/corner handle by `(dx, dy)` from the `origin` rectangle.
    ///
    /// Width and height never drop below `min_size`; when a west/north edge
    /// hits the minimum, the opposite edge stays put.
    pub fn resized(origin: Rect, handle: Handle, dx: f32, dy: f32, min_size: f32) -> Self {
        let (mut left, mut top, mut width, mut height) =
            (origin.x, origin.y, origin.width, origin.height);
        if handle.east() {
            width += dx;
        }
        if handle.south() {
            height += dy;
        }
        if handle.west() {
            left += dx;
            width -= dx;
        }
        if handle.north() {
            top += dy;
            height -= dy;
        }
        if width < min_size {
            if handle.west() {
                left = origin.x + origin.width - min_size;
            }
            width = min_size;
        }
        if height < min_size {
            if handle.north() {
                top = origin.y + origin.height - min_size;
            }
            height = min_size;
        }
        Self {
            rect: Rect::new(left, top, width, height),
        }
    }
}

/// Resize handles on the selection border.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::NW,
        Handle::N,
        Handle::NE,
        Handle::E,
        Handle::SE,
        Handle::S,
        Handle::SW,
        Handle::W,
    ];

    fn north(self) -> bool {
        matches!(self, Handle::N | Handle::NE | Handle::NW)
    }

    fn south(self) -> bool {
        matches!(self, Handle::S | Handle::SE | Handle::SW)
    }

    fn east(self) -> bool {
        matches!(self, Handle::E | Handle::NE | Handle::SE)
    }

    fn west(self) -> bool {
        matches!(self, Handle::W | Handle::NW | Handle::SW)
    }

    /// Logical position of this handle on `rect`.
    pub fn anchor(self, rect: Rect) -> Point {
        let cx = rect.x + rect.width / 2.0;
        let cy = rect.y + rect.height / 2.0;
        let x = if self.west() {
            rect.x
        } else if self.east() {
            rect.right()
        } else {
            cx
        };
        let y = if self.north() {
            rect.y
        } else if self.south() {
            rect.bottom()
        } else {
            cy
        };
        Point::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_drag_is_not_a_selection() {
        let err = SelectionRegion::from_drag(Point::new(100.0, 100.0), Point::new(109.0, 300.0));
        assert!(matches!(err, Err(AppError::InvalidSelection { .. })));
        assert!(SelectionRegion::from_drag(Point::new(0.0, 0.0), Point::new(10.0, 10.0)).is_ok());
    }

    #[test]
    fn drag_direction_is_normalized() {
        let sel = SelectionRegion::from_drag(Point::new(300.0, 250.0), Point::new(100.0, 100.0)).unwrap();
        assert_eq!(sel.rect(), Rect::new(100.0, 100.0, 200.0, 150.0));
    }

    #[test]
    fn physical_size_rounds_up() {
        assert_eq!(physical_size(1440, 900, 1.25), (1800, 1125));
        assert_eq!(physical_size(1367, 769, 1.5), (2051, 1154));
    }

    #[test]
    fn resize_keeps_opposite_edge_at_minimum() {
        let origin = Rect::new(100.0, 100.0, 50.0, 50.0);
        let sel = SelectionRegion::resized(origin, Handle::NW, 45.0, 45.0, 20.0);
        assert_eq!(sel.rect(), Rect::new(130.0, 130.0, 20.0, 20.0));
    }

    #[test]
    fn move_stays_inside_surface() {
        let surface = Rect::new(0.0, 0.0, 800.0, 600.0);
        let sel = SelectionRegion::from_rect(Rect::new(700.0, 10.0, 50.0, 50.0)).unwrap();
        let moved = sel.translated(200.0, -40.0, surface);
        assert_eq!(moved.rect(), Rect::new(750.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn distance_is_zero_inside() {
        let r = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(r.distance_sq(Point::new(50.0, 50.0)), 0.0);
        assert_eq!(r.distance_sq(Point::new(103.0, 104.0)), 25.0);
    }
}
