//! Camera overlay geometry.
//!
//! One path builder serves both the camera clip and its border, so the two
//! always outline the same shape.

use resvg::tiny_skia::{Path, PathBuilder, Rect};
use tokslides_project_model::placement::CameraShape;

/// Side of the camera footprint at scale 1, in canvas pixels.
pub const BASE_CAMERA_SIZE: f32 = 320.0;

/// Border stroke width in canvas pixels.
pub const BORDER_WIDTH: f32 = 8.0;

/// Border colour: white at 20% opacity.
pub const BORDER_RGBA: [u8; 4] = [255, 255, 255, 51];

// Cubic bezier handle length for a quarter circle.
const KAPPA: f32 = 0.552_284_8;

/// Size and corner treatment of the camera overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub width: f32,
    pub height: f32,
    pub corner_radius: f32,
    pub circular: bool,
}

impl Footprint {
    pub fn for_shape(shape: CameraShape, scale: f64) -> Self {
        let size = BASE_CAMERA_SIZE * scale as f32;
        let (width, height, corner_radius) = match shape {
            CameraShape::Circle => (size, size, size / 2.0),
            CameraShape::Square => (size, size, 0.0),
            CameraShape::Rounded => (size, size, 40.0),
            CameraShape::Portrait => (size * 0.75, size * 1.25, 20.0),
            CameraShape::Landscape => (size * 1.25, size * 0.75, 20.0),
        };
        Self {
            width,
            height,
            corner_radius,
            circular: shape == CameraShape::Circle,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }

    /// Outline centered at `(cx, cy)`.
    pub fn path(&self, cx: f32, cy: f32) -> Option<Path> {
        if self.circular {
            return PathBuilder::from_circle(cx, cy, self.width / 2.0);
        }
        rounded_rect_path(
            cx - self.width / 2.0,
            cy - self.height / 2.0,
            self.width,
            self.height,
            self.corner_radius,
        )
    }
}

/// Rectangle with circular corners; the radius is clamped to half the
/// shorter side.
pub fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    if r == 0.0 {
        return Some(PathBuilder::from_rect(Rect::from_xywh(x, y, w, h)?));
    }

    let k = r * (1.0 - KAPPA);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - k, y, x + w, y + k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - k, x + w - k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + k, y + h, x, y + h - k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + k, x + k, y, x + r, y);
    pb.close();
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprints() {
        let circle = Footprint::for_shape(CameraShape::Circle, 1.0);
        assert_eq!((circle.width, circle.height), (320.0, 320.0));
        assert!(circle.circular);

        let portrait = Footprint::for_shape(CameraShape::Portrait, 2.0);
        assert_eq!((portrait.width, portrait.height), (480.0, 800.0));
        assert_eq!(portrait.corner_radius, 20.0);

        let landscape = Footprint::for_shape(CameraShape::Landscape, 1.0);
        assert_eq!((landscape.width, landscape.height), (400.0, 240.0));

        assert_eq!(Footprint::for_shape(CameraShape::Square, 1.0).corner_radius, 0.0);
        assert_eq!(Footprint::for_shape(CameraShape::Rounded, 0.5).corner_radius, 40.0);
    }

    #[test]
    fn test_paths_bound_the_footprint() {
        for shape in CameraShape::ALL {
            let fp = Footprint::for_shape(shape, 1.0);
            let path = fp.path(540.0, 960.0).unwrap();
            let b = path.bounds();
            assert!((b.left() - (540.0 - fp.width / 2.0)).abs() < 0.5, "{shape}");
            assert!((b.right() - (540.0 + fp.width / 2.0)).abs() < 0.5, "{shape}");
            assert!((b.top() - (960.0 - fp.height / 2.0)).abs() < 0.5, "{shape}");
            assert!((b.bottom() - (960.0 + fp.height / 2.0)).abs() < 0.5, "{shape}");
        }
    }

    #[test]
    fn test_radius_clamped() {
        let path = rounded_rect_path(0.0, 0.0, 10.0, 40.0, 100.0).unwrap();
        assert!((path.bounds().width() - 10.0).abs() < 1e-3);
    }
}
