//! TokSlides Render Engine
//!
//! Everything that produces pixels: slide layout and rasterization, the
//! camera overlay geometry, and the per-tick frame compositor.
//!
//! # Pipeline
//!
//! ```text
//! markdown + theme ──► SlideSurface ──► Rasterizer ──► SlideSnapshot ─┐
//!                                                                     ├─► FrameCompositor ──► 1080×1920 frame
//! camera frame (+ segmentation mask) ─────────────────────────────────┘
//! ```

pub mod compositor;
pub mod frame;
pub mod markup;
pub mod placeholder;
pub mod rasterizer;
pub mod shape;
pub mod surface;

pub use compositor::{camera_center, cover_crop, CameraLayer, CompositeReport, CoverCrop, FrameCompositor};
pub use frame::{
    blank_pixmap, pixmap_to_rgba_image, CameraFrame, SegmentationMask, SlideSnapshot,
    CANVAS_HEIGHT, CANVAS_WIDTH,
};
pub use rasterizer::{RasterizeError, RasterizeOptions, Rasterizer, SurfaceRenderer, SvgSurfaceRenderer};
pub use resvg::tiny_skia::{Color, Pixmap};
pub use shape::Footprint;
pub use surface::SlideSurface;
