//! Bitmaps exchanged between the rasterizer, camera and compositor.
//!
//! All bitmaps are `tiny-skia` pixmaps (premultiplied RGBA8).

use std::path::Path;

use resvg::tiny_skia::{IntSize, Pixmap};
use tokslides_common::{TokslidesError, TokslidesResult};

/// Output canvas width in physical pixels.
pub const CANVAS_WIDTH: u32 = 1080;
/// Output canvas height in physical pixels.
pub const CANVAS_HEIGHT: u32 = 1920;

/// Logical slide width; the canvas is this scaled by [`PIXEL_RATIO`].
pub const BASE_WIDTH: f32 = 360.0;
pub const BASE_HEIGHT: f32 = 640.0;
pub const PIXEL_RATIO: f32 = 3.0;

const MAX_DIMENSION: u32 = 16_384;

/// Allocate a transparent pixmap, clamping dimensions into `1..=16384`.
pub fn blank_pixmap(width: u32, height: u32) -> Pixmap {
    let width = width.clamp(1, MAX_DIMENSION);
    let height = height.clamp(1, MAX_DIMENSION);
    Pixmap::new(width, height)
        .or_else(|| Pixmap::new(1, 1))
        .expect("1x1 pixmap is always allocatable")
}

/// A fully rendered slide. Immutable once built.
#[derive(Debug, Clone)]
pub struct SlideSnapshot {
    pixmap: Pixmap,
    degraded: bool,
}

impl SlideSnapshot {
    pub fn new(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            degraded: false,
        }
    }

    /// A placeholder produced after every render attempt failed.
    pub fn degraded(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            degraded: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Straight-alpha copy for encoding.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        pixmap_to_rgba_image(&self.pixmap)
    }

    pub fn save_png(&self, path: &Path) -> TokslidesResult<()> {
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| TokslidesError::render(format!("write {}: {e}", path.display())))
    }
}

/// Convert a premultiplied pixmap into a straight-alpha image.
pub fn pixmap_to_rgba_image(pixmap: &Pixmap) -> image::RgbaImage {
    let mut out = image::RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

/// Convert a straight-alpha image into a premultiplied pixmap.
pub fn rgba_image_to_pixmap(image: &image::RgbaImage) -> Option<Pixmap> {
    pixmap_from_rgba(image.width(), image.height(), image.as_raw().clone())
}

fn pixmap_from_rgba(width: u32, height: u32, mut data: Vec<u8>) -> Option<Pixmap> {
    if data.len() != width as usize * height as usize * 4 {
        return None;
    }
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a != 255 {
            px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
            px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
            px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, IntSize::from_wh(width, height)?)
}

/// One decoded camera frame.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pixmap: Pixmap,
    /// Capture time relative to the camera stream start.
    timestamp_ms: f64,
}

impl CameraFrame {
    /// Build a frame from tightly packed straight-alpha RGBA bytes.
    pub fn from_rgba(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: f64,
    ) -> TokslidesResult<Self> {
        let len = data.len();
        let pixmap = pixmap_from_rgba(width, height, data).ok_or_else(|| {
            TokslidesError::capture(format!(
                "camera frame of {len} bytes does not match {width}x{height} RGBA"
            ))
        })?;
        Ok(Self {
            pixmap,
            timestamp_ms,
        })
    }

    pub fn from_pixmap(pixmap: Pixmap, timestamp_ms: f64) -> Self {
        Self {
            pixmap,
            timestamp_ms,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }
}

/// Person/background mask for one camera frame. `255` keeps the pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build from per-pixel category labels where category `0` is the person.
    pub fn from_categories(width: u32, height: u32, categories: &[u8]) -> Option<Self> {
        let data = categories
            .iter()
            .map(|&c| if c == 0 { 255 } else { 0 })
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Nearest-neighbour coverage at normalized coordinates.
    pub fn sample(&self, u: f32, v: f32) -> u8 {
        let x = ((u.clamp(0.0, 1.0) * self.width as f32) as u32).min(self.width - 1);
        let y = ((v.clamp(0.0, 1.0) * self.height as f32) as u32).min(self.height - 1);
        self.data[(y * self.width + x) as usize]
    }
}
