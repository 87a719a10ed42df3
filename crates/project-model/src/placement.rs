//! Camera overlay placement.
//!
//! Position is expressed in percent of the output canvas (`0..=100` on each
//! axis) and marks the center of the camera shape. Scale multiplies the base
//! camera footprint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Smallest allowed camera scale.
pub const MIN_CAMERA_SCALE: f64 = 0.5;

/// Largest allowed camera scale.
pub const MAX_CAMERA_SCALE: f64 = 3.0;

/// Outline of the camera overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraShape {
    #[default]
    Circle,
    Square,
    Rounded,
    Portrait,
    Landscape,
}

impl CameraShape {
    pub const ALL: [CameraShape; 5] = [
        CameraShape::Circle,
        CameraShape::Square,
        CameraShape::Rounded,
        CameraShape::Portrait,
        CameraShape::Landscape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraShape::Circle => "circle",
            CameraShape::Square => "square",
            CameraShape::Rounded => "rounded",
            CameraShape::Portrait => "portrait",
            CameraShape::Landscape => "landscape",
        }
    }
}

impl fmt::Display for CameraShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected camera shape name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown camera shape '{0}' (expected circle, square, rounded, portrait or landscape)")]
pub struct InvalidCameraShape(pub String);

impl FromStr for CameraShape {
    type Err = InvalidCameraShape;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CameraShape::ALL
            .into_iter()
            .find(|shape| shape.as_str() == s)
            .ok_or_else(|| InvalidCameraShape(s.to_string()))
    }
}

/// Camera center in percent of the canvas.
///
/// Both axes always lie in `[0, 100]`; deserialized values are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPosition")]
pub struct Position {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct RawPosition {
    x: f64,
    y: f64,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        Self::new(raw.x, raw.y)
    }
}

impl Position {
    /// Create a position, clamping both axes to `[0, 100]`.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Offset by a percentage delta, clamping each axis independently.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Absolute canvas coordinates of this position.
    pub fn to_canvas(&self, canvas_width: f64, canvas_height: f64) -> (f64, f64) {
        (
            self.x / 100.0 * canvas_width,
            self.y / 100.0 * canvas_height,
        )
    }
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 100.0)
}

/// Where and how the camera overlay is drawn.
///
/// Scale always lies in `[MIN_CAMERA_SCALE, MAX_CAMERA_SCALE]`; every
/// constructor, setter and deserialization clamps it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPlacement")]
pub struct CameraPlacement {
    position: Position,
    scale: f64,
    shape: CameraShape,
}

#[derive(Deserialize)]
struct RawPlacement {
    position: Position,
    scale: f64,
    shape: CameraShape,
}

impl From<RawPlacement> for CameraPlacement {
    fn from(raw: RawPlacement) -> Self {
        Self::new(raw.position, raw.scale, raw.shape)
    }
}

impl Default for CameraPlacement {
    fn default() -> Self {
        Self {
            position: Position { x: 85.0, y: 85.0 },
            scale: 1.0,
            shape: CameraShape::Circle,
        }
    }
}

impl CameraPlacement {
    pub fn new(position: Position, scale: f64, shape: CameraShape) -> Self {
        Self {
            position,
            scale: clamp_scale(scale),
            shape,
        }
    }

    pub fn with_shape(mut self, shape: CameraShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn shape(&self) -> CameraShape {
        self.shape
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamp_scale(scale);
    }

    pub fn set_shape(&mut self, shape: CameraShape) {
        self.shape = shape;
    }

    /// Add to the scale, clamping to the allowed range.
    pub fn adjust_scale(&mut self, delta: f64) {
        self.set_scale(self.scale + delta);
    }

    pub fn move_by(&mut self, dx_percent: f64, dy_percent: f64) {
        self.position = self.position.offset(dx_percent, dy_percent);
    }
}

/// Clamp a camera scale into `[MIN_CAMERA_SCALE, MAX_CAMERA_SCALE]`.
pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_CAMERA_SCALE, MAX_CAMERA_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_placement() {
        let p = CameraPlacement::default();
        assert_eq!(p.position(), Position::new(85.0, 85.0));
        assert_eq!(p.scale(), 1.0);
        assert_eq!(p.shape(), CameraShape::Circle);
    }

    #[test]
    fn test_shape_wire_names() {
        let json = serde_json::to_string(&CameraShape::Landscape).unwrap();
        assert_eq!(json, "\"landscape\"");
        let parsed: CameraShape = serde_json::from_str("\"rounded\"").unwrap();
        assert_eq!(parsed, CameraShape::Rounded);
        assert!(serde_json::from_str::<CameraShape>("\"hexagon\"").is_err());
    }

    #[test]
    fn test_shape_from_str_rejects_unknown() {
        assert_eq!("portrait".parse::<CameraShape>(), Ok(CameraShape::Portrait));
        assert!("Circle".parse::<CameraShape>().is_err());
        assert!("".parse::<CameraShape>().is_err());
    }

    #[test]
    fn test_scale_boundaries() {
        let mut p = CameraPlacement::default();
        p.set_scale(0.5);
        assert_eq!(p.scale(), 0.5);
        p.set_scale(3.0);
        assert_eq!(p.scale(), 3.0);
        p.adjust_scale(0.01);
        assert_eq!(p.scale(), 3.0);
        p.set_scale(0.49);
        assert_eq!(p.scale(), 0.5);
        p.set_scale(f64::NAN);
        assert_eq!(p.scale(), 1.0);
    }

    #[test]
    fn test_deserialize_clamps_out_of_range_values() {
        let p: CameraPlacement = serde_json::from_str(
            r#"{"position":{"x":500.0,"y":-20.0},"scale":10.0,"shape":"circle"}"#,
        )
        .unwrap();
        assert_eq!(p.position(), Position::new(100.0, 0.0));
        assert_eq!(p.scale(), MAX_CAMERA_SCALE);

        let p: CameraPlacement = serde_json::from_str(
            r#"{"position":{"x":40.0,"y":60.0},"scale":0.1,"shape":"portrait"}"#,
        )
        .unwrap();
        assert_eq!((p.position().x(), p.position().y()), (40.0, 60.0));
        assert_eq!(p.scale(), MIN_CAMERA_SCALE);
        assert_eq!(p.shape(), CameraShape::Portrait);
    }

    #[test]
    fn test_serialized_shape_is_unchanged() {
        let p = CameraPlacement::new(Position::new(10.0, 20.0), 2.0, CameraShape::Rounded);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(
            json,
            r#"{"position":{"x":10.0,"y":20.0},"scale":2.0,"shape":"rounded"}"#
        );
        assert_eq!(serde_json::from_str::<CameraPlacement>(&json).unwrap(), p);
    }

    #[test]
    fn test_center_to_canvas() {
        let pos = Position::new(50.0, 50.0);
        assert_eq!(pos.to_canvas(1080.0, 1920.0), (540.0, 960.0));
    }

    proptest! {
        #[test]
        fn prop_position_always_in_range(x in -1e6f64..1e6, y in -1e6f64..1e6, dx in -500f64..500.0, dy in -500f64..500.0) {
            let pos = Position::new(x, y).offset(dx, dy);
            prop_assert!((0.0..=100.0).contains(&pos.x()));
            prop_assert!((0.0..=100.0).contains(&pos.y()));
        }

        #[test]
        fn prop_scale_always_in_range(start in 0.5f64..=3.0, deltas in proptest::collection::vec(-5f64..5.0, 0..20)) {
            let mut p = CameraPlacement::new(Position::new(50.0, 50.0), start, CameraShape::Square);
            for d in deltas {
                p.adjust_scale(d);
                prop_assert!(p.scale() >= MIN_CAMERA_SCALE && p.scale() <= MAX_CAMERA_SCALE);
            }
        }
    }
}
