//! Optional person segmentation used to key out the camera background.
//!
//! Compositing works the same without a segmenter; a segmenter that fails
//! to initialize is discarded and the camera is drawn unkeyed.

use tokslides_render_engine::{CameraFrame, SegmentationMask};

pub trait Segmenter: Send {
    /// Prepare the model. `false` means segmentation is unavailable.
    fn initialize(&mut self) -> bool;

    /// Mask for one frame, or `None` when this frame could not be segmented.
    fn segment_frame(&mut self, frame: &CameraFrame, timestamp_ms: f64) -> Option<SegmentationMask>;

    fn dispose(&mut self);
}
