//! Drag handling for the selection rectangle.
//!
//! A drag outside the current selection starts a new one; a drag on a handle
//! resizes it and a drag inside moves it. Coordinates are window-local
//! logical points.

use super::rendering::{point, HANDLE_SIZE};
use crate::geometry::{Handle, Point, Rect, SelectionRegion};
use eframe::egui;

/// Result of feeding one pointer event to the selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionEvent {
    /// A new rectangle is being dragged out.
    Started,
    Dragging,
    /// A new rectangle was released at a valid size.
    Completed,
    /// An existing selection was moved or resized.
    Adjusted,
    /// The drag was too small; there is no selection now.
    Cancelled,
    None,
}

#[derive(Debug, Clone, Copy)]
enum Drag {
    Creating { start: Point, current: Point },
    Moving { origin: SelectionRegion, start: Point },
    Resizing { origin: Rect, handle: Handle, start: Point },
}

#[derive(Debug, Clone)]
pub struct SelectionTool {
    surface: Rect,
    min_resize: f32,
    region: Option<SelectionRegion>,
    drag: Option<Drag>,
    locked: bool,
}

impl SelectionTool {
    /// `surface` bounds moves; `min_resize` is the smallest edge a resize keeps.
    pub fn new(surface: Rect, min_resize: f32) -> Self {
        Self {
            surface,
            min_resize,
            region: None,
            drag: None,
            locked: false,
        }
    }

    pub fn region(&self) -> Option<SelectionRegion> {
        self.region
    }

    pub fn set_region(&mut self, region: SelectionRegion) {
        self.region = Some(region);
        self.drag = None;
    }

    /// Frozen selections ignore pointer input (e.g. while recording).
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// The rectangle to paint: the one being dragged out, else the selection.
    pub fn visible_rect(&self) -> Option<Rect> {
        match self.drag {
            Some(Drag::Creating { start, current }) => Some(Rect::from_corners(start, current)),
            _ => self.region.map(|r| r.rect()),
        }
    }

    pub fn handle_at(&self, p: Point) -> Option<Handle> {
        let rect = self.region?.rect();
        let reach = HANDLE_SIZE * HANDLE_SIZE;
        Handle::ALL.into_iter().find(|h| {
            let a = h.anchor(rect);
            let (dx, dy) = (a.x - p.x, a.y - p.y);
            dx * dx + dy * dy <= reach
        })
    }

    pub fn press(&mut self, p: Point) -> SelectionEvent {
        if self.locked {
            return SelectionEvent::None;
        }
        if let Some(region) = self.region {
            if let Some(handle) = self.handle_at(p) {
                self.drag = Some(Drag::Resizing { origin: region.rect(), handle, start: p });
                return SelectionEvent::Dragging;
            }
            if region.rect().contains(p) {
                self.drag = Some(Drag::Moving { origin: region, start: p });
                return SelectionEvent::Dragging;
            }
        }
        self.region = None;
        self.drag = Some(Drag::Creating { start: p, current: p });
        SelectionEvent::Started
    }

    pub fn drag_to(&mut self, p: Point) -> SelectionEvent {
        match self.drag.as_mut() {
            Some(Drag::Creating { current, .. }) => *current = p,
            Some(Drag::Moving { origin, start }) => {
                self.region = Some(origin.translated(p.x - start.x, p.y - start.y, self.surface));
            }
            Some(Drag::Resizing { origin, handle, start }) => {
                self.region = Some(SelectionRegion::resized(
                    *origin,
                    *handle,
                    p.x - start.x,
                    p.y - start.y,
                    self.min_resize,
                ));
            }
            None => return SelectionEvent::None,
        }
        SelectionEvent::Dragging
    }

    pub fn release(&mut self, p: Point) -> SelectionEvent {
        match self.drag.take() {
            Some(Drag::Creating { start, .. }) => match SelectionRegion::from_drag(start, p) {
                Ok(region) => {
                    self.region = Some(region);
                    SelectionEvent::Completed
                }
                Err(e) => {
                    log::debug!("{}", e);
                    self.region = None;
                    SelectionEvent::Cancelled
                }
            },
            Some(_) => SelectionEvent::Adjusted,
            None => SelectionEvent::None,
        }
    }

    /// Feeds an egui drag response through `press`/`drag_to`/`release`.
    pub fn handle_response(&mut self, response: &egui::Response) -> SelectionEvent {
        let Some(pos) = response.interact_pointer_pos().map(point) else {
            return SelectionEvent::None;
        };
        if response.drag_started() {
            return self.press(pos);
        }
        if response.drag_stopped() {
            return self.release(pos);
        }
        if response.dragged() {
            return self.drag_to(pos);
        }
        SelectionEvent::None
    }
}
