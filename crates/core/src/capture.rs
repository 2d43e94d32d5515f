//! Display source resolution.
//!
//! Finds the display a capture should target (the one nearest the pointer),
//! grabs a still frame of it at physical resolution, and hands back an opaque
//! source handle the recorder can use for live capture.
//!
//! # Example
//!
//! ```ignore
//! use clipcap_core::capture::{DisplayResolver, ScreenCapturer};
//!
//! let resolver = DisplayResolver::new(Arc::new(ScreenCapturer::new()?));
//! let target = resolver.resolve(pointer.position()).await?;
//! println!("{} -> {}", target.display, target.source.handle);
//! ```

use crate::error::{AppError, Result};
use crate::geometry::{physical_size, Point, Rect};
use async_trait::async_trait;
use image::DynamicImage;
use screenshots::Screen;
use std::fmt;
use std::sync::{Arc, RwLock};

/// One monitor, in the desktop's logical coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: u32,
    pub bounds: Rect,
    pub scale_factor: f32,
    pub is_primary: bool,
}

impl DisplayInfo {
    /// Pixel size a still frame of this display must have to stay sharp.
    pub fn physical_size(&self) -> (u32, u32) {
        physical_size(
            self.bounds.width as u32,
            self.bounds.height as u32,
            self.scale_factor,
        )
    }
}

impl fmt::Display for DisplayInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Monitor {}: {}x{} at ({}, {}) (scale: {}){}",
            self.id,
            self.bounds.width,
            self.bounds.height,
            self.bounds.x,
            self.bounds.y,
            self.scale_factor,
            if self.is_primary { " [primary]" } else { "" }
        )
    }
}

/// Opaque identifier of a capturable display, used to request live frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn for_display(display_id: u32) -> Self {
        Self(format!("screen:{}:0", display_id))
    }

    /// Display id encoded in the handle, if it is a screen source.
    pub fn display_id(&self) -> Option<u32> {
        self.0.strip_prefix("screen:")?.split(':').next()?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A still frame plus the handle of the source it came from.
#[derive(Clone)]
pub struct CaptureSource {
    pub handle: SourceHandle,
    pub thumbnail: Arc<DynamicImage>,
}

/// The OS capture API as the resolver needs it.
#[async_trait]
pub trait DisplaySource: Send + Sync {
    /// Currently attached displays.
    async fn displays(&self) -> Result<Vec<DisplayInfo>>;

    /// Grabs a still frame of `display` sized `width` x `height`.
    ///
    /// `Ok(None)` means the OS offered no capturable source for it.
    async fn capture_source(
        &self,
        display: &DisplayInfo,
        width: u32,
        height: u32,
    ) -> Result<Option<CaptureSource>>;
}

/// Last known global pointer position, fed by whatever input hook is running.
#[derive(Clone, Default)]
pub struct PointerTracker {
    inner: Arc<RwLock<Point>>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, x: f32, y: f32) {
        if let Ok(mut p) = self.inner.write() {
            *p = Point::new(x, y);
        }
    }

    pub fn position(&self) -> Point {
        self.inner.read().map(|p| *p).unwrap_or_default()
    }
}

/// The display whose bounds are closest to `point` (containing it, if any).
pub fn nearest_display(displays: &[DisplayInfo], point: Point) -> Option<&DisplayInfo> {
    displays.iter().min_by(|a, b| {
        a.bounds
            .distance_sq(point)
            .total_cmp(&b.bounds.distance_sq(point))
    })
}

/// Display chosen for a session together with its still frame.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub display: DisplayInfo,
    pub source: CaptureSource,
}

pub struct DisplayResolver {
    source: Arc<dyn DisplaySource>,
}

impl DisplayResolver {
    pub fn new(source: Arc<dyn DisplaySource>) -> Self {
        Self { source }
    }

    /// Resolves the display nearest `pointer` and captures it.
    ///
    /// # Errors
    ///
    /// [`AppError::SourceUnavailable`] when no display or no source exists;
    /// capture failures are passed through.
    pub async fn resolve(&self, pointer: Point) -> Result<ResolvedTarget> {
        let displays = self.source.displays().await?;
        let display = nearest_display(&displays, pointer)
            .cloned()
            .ok_or(AppError::SourceUnavailable)?;

        let (width, height) = display.physical_size();
        log::debug!("Capturing {} at {}x{}", display, width, height);

        let source = self
            .source
            .capture_source(&display, width, height)
            .await?
            .ok_or(AppError::SourceUnavailable)?;

        Ok(ResolvedTarget { display, source })
    }
}

/// Screen capturer backed by the `screenshots` crate.
///
/// Screens are enumerated on every call so hot-plugged monitors are picked up
/// by a long-running daemon.
pub struct ScreenCapturer;

impl ScreenCapturer {
    /// Checks that at least one screen can be enumerated.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ScreenCapture`] if:
    /// - Screen enumeration fails (e.g., no display server available)
    /// - No screens are detected
    pub fn new() -> Result<Self> {
        let screens = Self::screens()?;
        if screens.is_empty() {
            return Err(AppError::capture("No screens detected"));
        }
        Ok(Self)
    }

    fn screens() -> Result<Vec<Screen>> {
        Screen::all().map_err(|e| AppError::capture(format!("Failed to enumerate screens: {}", e)))
    }

    fn describe(screen: &Screen) -> DisplayInfo {
        let info = &screen.display_info;
        DisplayInfo {
            id: info.id,
            bounds: Rect::new(
                info.x as f32,
                info.y as f32,
                info.width as f32,
                info.height as f32,
            ),
            scale_factor: info.scale_factor,
            is_primary: info.is_primary,
        }
    }

    /// Lists available screens with their dimensions and metadata.
    pub fn list_screens(&self) -> Result<Vec<DisplayInfo>> {
        Ok(Self::screens()?.iter().map(Self::describe).collect())
    }

    /// Captures one screen by id at its native resolution.
    pub fn capture_display(display_id: u32) -> Result<DynamicImage> {
        let screen = Self::screens()?
            .into_iter()
            .find(|s| s.display_info.id == display_id)
            .ok_or(AppError::ScreenNotFound(display_id))?;

        let captured = screen
            .capture()
            .map_err(|e| AppError::capture(format!("Failed to capture screen: {}", e)))?;

        // Convert screenshots::Image to image::DynamicImage
        let width = captured.width();
        let height = captured.height();
        let rgba_data = captured.into_raw();

        let img_buffer = image::ImageBuffer::from_raw(width, height, rgba_data)
            .ok_or_else(|| AppError::capture("Failed to create image buffer"))?;

        Ok(DynamicImage::ImageRgba8(img_buffer))
    }

    /// Captures a logical rectangle of one screen, relative to the screen origin.
    pub fn capture_area(display_id: u32, area: Rect) -> Result<image::RgbaImage> {
        let screen = Self::screens()?
            .into_iter()
            .find(|s| s.display_info.id == display_id)
            .ok_or(AppError::ScreenNotFound(display_id))?;

        let captured = screen
            .capture_area(
                area.x as i32,
                area.y as i32,
                area.width as u32,
                area.height as u32,
            )
            .map_err(|e| AppError::capture(format!("Failed to capture region: {}", e)))?;

        let width = captured.width();
        let height = captured.height();
        image::ImageBuffer::from_raw(width, height, captured.into_raw())
            .ok_or_else(|| AppError::capture("Failed to create image buffer"))
    }
}

#[async_trait]
impl DisplaySource for ScreenCapturer {
    async fn displays(&self) -> Result<Vec<DisplayInfo>> {
        tokio::task::spawn_blocking(|| {
            Ok(Self::screens()?.iter().map(Self::describe).collect())
        })
        .await
        .map_err(|e| AppError::capture(format!("display enumeration task failed: {}", e)))?
    }

    async fn capture_source(
        &self,
        display: &DisplayInfo,
        width: u32,
        height: u32,
    ) -> Result<Option<CaptureSource>> {
        let id = display.id;
        let frame = tokio::task::spawn_blocking(move || -> Result<Option<DynamicImage>> {
            let frame = match Self::capture_display(id) {
                Ok(frame) => frame,
                Err(AppError::ScreenNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            if frame.width() == width && frame.height() == height {
                Ok(Some(frame))
            } else {
                Ok(Some(frame.resize_exact(
                    width,
                    height,
                    image::imageops::FilterType::Lanczos3,
                )))
            }
        })
        .await
        .map_err(|e| AppError::capture(format!("capture task failed: {}", e)))??;

        Ok(frame.map(|thumbnail| CaptureSource {
            handle: SourceHandle::for_display(id),
            thumbnail: Arc::new(thumbnail),
        }))
    }
}
