//! Camera placement shared between gesture handlers and the composition
//! loop.
//!
//! The loop never captures a placement by value. It calls
//! [`PlacementHandle::get`] on every tick, so a gesture applied between two
//! ticks is visible on the next one.

use std::sync::{Arc, RwLock};

use tokslides_project_model::placement::{CameraPlacement, CameraShape};
use tokslides_render_engine::frame::{BASE_HEIGHT, BASE_WIDTH};

/// Scale change per unit of wheel delta.
pub const WHEEL_SCALE_STEP: f64 = 0.001;

/// Share of the viewport the preview fills outside fullscreen.
const WINDOWED_FILL: f64 = 0.98;

/// Shared, always-current placement cell.
#[derive(Debug, Clone, Default)]
pub struct PlacementHandle {
    inner: Arc<RwLock<CameraPlacement>>,
}

impl PlacementHandle {
    pub fn new(placement: CameraPlacement) -> Self {
        Self {
            inner: Arc::new(RwLock::new(placement)),
        }
    }

    /// Latest placement.
    pub fn get(&self) -> CameraPlacement {
        *self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update(&self, f: impl FnOnce(&mut CameraPlacement)) -> CameraPlacement {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
        *guard
    }
}

/// What the host should do with the input event after a wheel gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct WheelResponse {
    /// Suppress the event's default scrolling.
    pub prevent_default: bool,
}

/// Drag and wheel gestures on the live preview.
#[derive(Debug)]
pub struct PlacementModel {
    handle: PlacementHandle,
    preview_scale: f64,
    drag_origin: Option<(f64, f64)>,
}

impl PlacementModel {
    pub fn new(handle: PlacementHandle) -> Self {
        Self {
            handle,
            preview_scale: 1.0,
            drag_origin: None,
        }
    }

    pub fn handle(&self) -> PlacementHandle {
        self.handle.clone()
    }

    pub fn placement(&self) -> CameraPlacement {
        self.handle.get()
    }

    /// Display scale of the preview (rendered size / logical size).
    pub fn set_preview_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.preview_scale = scale;
        }
    }

    pub fn preview_scale(&self) -> f64 {
        self.preview_scale
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    pub fn pointer_down(&mut self, screen_x: f64, screen_y: f64) {
        self.drag_origin = Some((screen_x, screen_y));
    }

    /// Move the camera by the pointer delta since the previous event.
    /// Returns the new placement, or `None` when no drag is active.
    pub fn pointer_move(&mut self, screen_x: f64, screen_y: f64) -> Option<CameraPlacement> {
        let (start_x, start_y) = self.drag_origin?;
        let (dx, dy) = drag_delta_percent(screen_x - start_x, screen_y - start_y, self.preview_scale);
        self.drag_origin = Some((screen_x, screen_y));
        Some(self.handle.update(|p| p.move_by(dx, dy)))
    }

    pub fn pointer_up(&mut self) {
        self.drag_origin = None;
    }

    /// Zoom the camera. Scrolling down shrinks it.
    pub fn wheel(&mut self, delta_y: f64) -> WheelResponse {
        if delta_y.is_finite() {
            self.handle
                .update(|p| p.adjust_scale(-delta_y * WHEEL_SCALE_STEP));
        }
        WheelResponse {
            prevent_default: true,
        }
    }

    pub fn set_shape(&mut self, shape: CameraShape) {
        self.handle.update(|p| p.set_shape(shape));
    }
}

/// Convert a screen-pixel drag into a percentage delta of the canvas.
pub fn drag_delta_percent(dx: f64, dy: f64, preview_scale: f64) -> (f64, f64) {
    (
        dx / (BASE_WIDTH as f64 * preview_scale) * 100.0,
        dy / (BASE_HEIGHT as f64 * preview_scale) * 100.0,
    )
}

/// Largest scale at which the 360×640 preview fits the viewport.
pub fn preview_scale(viewport_width: f64, viewport_height: f64, fullscreen: bool) -> f64 {
    let fit = (viewport_width / BASE_WIDTH as f64).min(viewport_height / BASE_HEIGHT as f64);
    if fullscreen {
        fit
    } else {
        fit * WINDOWED_FILL
    }
}
