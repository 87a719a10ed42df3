//! Frame compositor: slide snapshot plus shaped, mirrored camera overlay.
//!
//! Each call overwrites the whole target:
//!
//! ```text
//! black fill ──► slide (stretched) ──► camera (clipped, cover-cropped,
//!                                      mirrored) ──► border stroke
//! ```
//!
//! Missing inputs skip their step; compositing itself cannot fail.

use resvg::tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, Pixmap, PixmapPaint, Stroke, Transform,
};
use tokslides_project_model::placement::{CameraPlacement, Position};

use crate::frame::{CameraFrame, SegmentationMask, SlideSnapshot};
use crate::shape::{Footprint, BORDER_RGBA, BORDER_WIDTH};

/// Destination rectangle of the camera image relative to the footprint
/// center, before mirroring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverCrop {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale a `source_width`×`source_height` image so it covers the footprint,
/// centered, trimming the overflow on one axis.
pub fn cover_crop(source_width: f32, source_height: f32, footprint: &Footprint) -> CoverCrop {
    let source_ratio = source_width / source_height;
    let (width, height) = if source_ratio > footprint.aspect_ratio() {
        (footprint.height * source_ratio, footprint.height)
    } else {
        (footprint.width, footprint.width / source_ratio)
    };
    CoverCrop {
        x: -width / 2.0,
        y: -height / 2.0,
        width,
        height,
    }
}

/// Canvas coordinates of the camera center.
pub fn camera_center(position: Position, canvas_width: u32, canvas_height: u32) -> (f32, f32) {
    let (x, y) = position.to_canvas(canvas_width as f64, canvas_height as f64);
    (x as f32, y as f32)
}

/// Live camera input for one tick.
#[derive(Debug, Clone, Copy)]
pub struct CameraLayer<'a> {
    pub frame: &'a CameraFrame,
    /// Person mask; background pixels are keyed out when present.
    pub mask: Option<&'a SegmentationMask>,
}

/// What a composite tick actually drew.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompositeReport {
    pub slide_drawn: bool,
    pub camera: Option<CameraDraw>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDraw {
    pub center: (f32, f32),
    pub footprint: Footprint,
    pub crop: CoverCrop,
}

/// Draws output frames. Holds scratch buffers reused across ticks.
#[derive(Default)]
pub struct FrameCompositor {
    clip: Option<Mask>,
    keyed: Option<Pixmap>,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw one finished output frame into `target`.
    pub fn composite_frame(
        &mut self,
        target: &mut Pixmap,
        slide: Option<&SlideSnapshot>,
        camera: Option<CameraLayer<'_>>,
        placement: &CameraPlacement,
    ) -> CompositeReport {
        let mut report = CompositeReport::default();
        target.fill(Color::BLACK);

        if let Some(snapshot) = slide {
            let sx = target.width() as f32 / snapshot.width() as f32;
            let sy = target.height() as f32 / snapshot.height() as f32;
            target.draw_pixmap(
                0,
                0,
                snapshot.pixmap().as_ref(),
                &PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                },
                Transform::from_scale(sx, sy),
                None,
            );
            report.slide_drawn = true;
        }

        if let Some(layer) = camera {
            report.camera = self.draw_camera(target, layer, placement);
        }

        report
    }

    fn draw_camera(
        &mut self,
        target: &mut Pixmap,
        layer: CameraLayer<'_>,
        placement: &CameraPlacement,
    ) -> Option<CameraDraw> {
        let frame = layer.frame;
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);

        let footprint = Footprint::for_shape(placement.shape(), placement.scale());
        let center = camera_center(placement.position(), target.width(), target.height());
        let outline = footprint.path(center.0, center.1)?;

        let clip = match self.clip.take() {
            Some(mut mask) if mask.width() == target.width() && mask.height() == target.height() => {
                mask.data_mut().fill(0);
                mask
            }
            _ => Mask::new(target.width(), target.height())?,
        };
        let clip = self.clip.insert(clip);
        clip.fill_path(&outline, FillRule::Winding, true, Transform::identity());

        let crop = cover_crop(fw, fh, &footprint);
        let source = match layer.mask {
            Some(mask) => key_out_background(frame, mask, &mut self.keyed),
            None => frame.pixmap(),
        };

        // Selfie view: mirror around the footprint center.
        let transform = Transform::from_translate(center.0, center.1)
            .pre_scale(-1.0, 1.0)
            .pre_translate(crop.x, crop.y)
            .pre_scale(crop.width / fw, crop.height / fh);
        target.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint {
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            },
            transform,
            Some(&*clip),
        );

        let mut paint = Paint::default();
        let [r, g, b, a] = BORDER_RGBA;
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        target.stroke_path(
            &outline,
            &paint,
            &Stroke {
                width: BORDER_WIDTH,
                ..Stroke::default()
            },
            Transform::identity(),
            None,
        );

        Some(CameraDraw {
            center,
            footprint,
            crop,
        })
    }
}

/// Copy of the frame with background pixels made transparent.
fn key_out_background<'a>(
    frame: &CameraFrame,
    mask: &SegmentationMask,
    scratch: &'a mut Option<Pixmap>,
) -> &'a Pixmap {
    let source = frame.pixmap();
    let reusable = matches!(scratch, Some(p) if p.width() == source.width() && p.height() == source.height());
    if !reusable {
        *scratch = Some(source.clone());
    }
    let keyed = scratch.get_or_insert_with(|| source.clone());
    keyed.data_mut().copy_from_slice(source.data());

    let (w, h) = (source.width() as usize, source.height() as usize);
    for (i, px) in keyed.data_mut().chunks_exact_mut(4).enumerate() {
        let u = ((i % w) as f32 + 0.5) / w as f32;
        let v = ((i / w) as f32 + 0.5) / h as f32;
        let coverage = mask.sample(u, v) as u16;
        if coverage == 255 {
            continue;
        }
        for c in px.iter_mut() {
            *c = ((*c as u16 * coverage + 127) / 255) as u8;
        }
    }
    keyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{blank_pixmap, CANVAS_HEIGHT, CANVAS_WIDTH};
    use proptest::prelude::*;
    use tokslides_project_model::placement::{CameraShape, MAX_CAMERA_SCALE, MIN_CAMERA_SCALE};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Pixmap {
        let mut p = blank_pixmap(width, height);
        p.fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
        p
    }

    fn rgb_at(p: &Pixmap, x: u32, y: u32) -> [u8; 3] {
        let c = p.pixel(x, y).unwrap();
        [c.red(), c.green(), c.blue()]
    }

    fn canvas() -> Pixmap {
        blank_pixmap(CANVAS_WIDTH, CANVAS_HEIGHT)
    }

    fn placement(x: f64, y: f64, scale: f64, shape: CameraShape) -> CameraPlacement {
        CameraPlacement::new(Position::new(x, y), scale, shape)
    }

    #[test]
    fn test_empty_inputs_give_opaque_black() {
        let mut target = solid(8, 8, [255, 255, 255, 255]);
        let report = FrameCompositor::new().composite_frame(
            &mut target,
            None,
            None,
            &CameraPlacement::default(),
        );
        assert_eq!(report, CompositeReport::default());
        assert!(target.pixels().iter().all(|p| p.alpha() == 255 && p.red() == 0));
    }

    #[test]
    fn test_slide_is_stretched_to_fill() {
        let snapshot = SlideSnapshot::new(solid(36, 64, [255, 0, 80, 255]));
        let mut target = canvas();
        let report = FrameCompositor::new().composite_frame(
            &mut target,
            Some(&snapshot),
            None,
            &CameraPlacement::default(),
        );
        assert!(report.slide_drawn);
        assert_eq!(rgb_at(&target, 540, 960), [255, 0, 80]);
        assert_eq!(rgb_at(&target, 5, 5), [255, 0, 80]);
        assert_eq!(rgb_at(&target, 1074, 1914), [255, 0, 80]);
    }

    #[test]
    fn test_centered_circle_lands_on_canvas_center() {
        let frame = CameraFrame::from_pixmap(solid(64, 48, [0, 255, 0, 255]), 0.0);
        let mut target = canvas();
        let report = FrameCompositor::new().composite_frame(
            &mut target,
            None,
            Some(CameraLayer {
                frame: &frame,
                mask: None,
            }),
            &placement(50.0, 50.0, 1.0, CameraShape::Circle),
        );
        let draw = report.camera.unwrap();
        assert_eq!(draw.center, (540.0, 960.0));
        assert_eq!(rgb_at(&target, 540, 960), [0, 255, 0]);
        // Inside the square bounding box but outside the circle.
        assert_eq!(rgb_at(&target, 540 - 150, 960 - 150), [0, 0, 0]);
        assert_eq!(rgb_at(&target, 540 + 200, 960), [0, 0, 0]);
    }

    #[test]
    fn test_camera_is_mirrored() {
        let mut source = solid(64, 64, [255, 0, 0, 255]);
        source.fill_rect(
            resvg::tiny_skia::Rect::from_xywh(32.0, 0.0, 32.0, 64.0).unwrap(),
            &{
                let mut p = Paint::default();
                p.set_color_rgba8(0, 0, 255, 255);
                p
            },
            Transform::identity(),
            None,
        );
        let frame = CameraFrame::from_pixmap(source, 0.0);
        let mut target = canvas();
        FrameCompositor::new().composite_frame(
            &mut target,
            None,
            Some(CameraLayer {
                frame: &frame,
                mask: None,
            }),
            &placement(50.0, 50.0, 1.0, CameraShape::Square),
        );
        // Source right half (blue) appears on the left.
        assert_eq!(rgb_at(&target, 540 - 80, 960), [0, 0, 255]);
        assert_eq!(rgb_at(&target, 540 + 80, 960), [255, 0, 0]);
    }

    #[test]
    fn test_border_outlines_shape() {
        let frame = CameraFrame::from_pixmap(solid(32, 32, [0, 0, 0, 255]), 0.0);
        let mut target = canvas();
        FrameCompositor::new().composite_frame(
            &mut target,
            None,
            Some(CameraLayer {
                frame: &frame,
                mask: None,
            }),
            &placement(50.0, 50.0, 1.0, CameraShape::Square),
        );
        // Left edge is at x = 380; the stroke straddles it.
        let [r, _, _] = rgb_at(&target, 378, 960);
        assert!((45..=57).contains(&r), "border value {r}");
        assert_eq!(rgb_at(&target, 370, 960), [0, 0, 0]);
    }

    #[test]
    fn test_segmentation_mask_keys_out_background() {
        let frame = CameraFrame::from_pixmap(solid(16, 16, [0, 255, 0, 255]), 0.0);
        let everything_background = SegmentationMask::from_categories(4, 4, &[1; 16]).unwrap();
        let mut compositor = FrameCompositor::new();
        let mut target = canvas();
        compositor.composite_frame(
            &mut target,
            None,
            Some(CameraLayer {
                frame: &frame,
                mask: Some(&everything_background),
            }),
            &placement(50.0, 50.0, 1.0, CameraShape::Square),
        );
        assert_eq!(rgb_at(&target, 540, 960), [0, 0, 0]);

        let everyone = SegmentationMask::from_categories(4, 4, &[0; 16]).unwrap();
        compositor.composite_frame(
            &mut target,
            None,
            Some(CameraLayer {
                frame: &frame,
                mask: Some(&everyone),
            }),
            &placement(50.0, 50.0, 1.0, CameraShape::Square),
        );
        assert_eq!(rgb_at(&target, 540, 960), [0, 255, 0]);
    }

    #[test]
    fn test_cover_crop_directions() {
        let square = Footprint::for_shape(CameraShape::Square, 1.0);
        let wide = cover_crop(640.0, 480.0, &square);
        assert_eq!(wide.height, 320.0);
        assert!((wide.width - 426.666_66).abs() < 1e-2);
        assert_eq!(wide.x, -wide.width / 2.0);

        let portrait = Footprint::for_shape(CameraShape::Portrait, 1.0);
        let tall = cover_crop(480.0, 640.0, &Footprint::for_shape(CameraShape::Landscape, 1.0));
        assert_eq!(tall.width, 400.0);
        assert!(tall.height > 240.0);
        let same = cover_crop(240.0, 400.0, &portrait);
        assert!((same.width - 240.0).abs() < 1e-2);
        assert!((same.height - 400.0).abs() < 1e-2);
    }

    fn shapes() -> impl Strategy<Value = CameraShape> {
        prop::sample::select(CameraShape::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_camera_center_within_canvas(
            x in 0.0f64..=100.0,
            y in 0.0f64..=100.0,
            scale in MIN_CAMERA_SCALE..=MAX_CAMERA_SCALE,
            shape in shapes(),
        ) {
            let p = placement(x, y, scale, shape);
            let (cx, cy) = camera_center(p.position(), CANVAS_WIDTH, CANVAS_HEIGHT);
            prop_assert!((0.0..=CANVAS_WIDTH as f32).contains(&cx));
            prop_assert!((0.0..=CANVAS_HEIGHT as f32).contains(&cy));
        }

        #[test]
        fn prop_cover_crop_never_underfills(
            src_w in 16u32..4000,
            src_h in 16u32..4000,
            scale in MIN_CAMERA_SCALE..=MAX_CAMERA_SCALE,
            shape in shapes(),
        ) {
            let fp = Footprint::for_shape(shape, scale);
            let crop = cover_crop(src_w as f32, src_h as f32, &fp);
            let eps = 1e-3 * fp.width.max(fp.height);
            let source_ratio = src_w as f32 / src_h as f32;
            if source_ratio > fp.aspect_ratio() {
                prop_assert!((crop.height - fp.height).abs() <= eps);
                prop_assert!(crop.width + eps >= fp.width);
            } else {
                prop_assert!((crop.width - fp.width).abs() <= eps);
                prop_assert!(crop.height + eps >= fp.height);
            }
            prop_assert!((crop.x + crop.width / 2.0).abs() <= eps);
            prop_assert!((crop.y + crop.height / 2.0).abs() <= eps);
        }
    }
}
