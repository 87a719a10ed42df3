//! Live camera state: the latest decoded frame and the device that feeds it.

use std::sync::{Arc, Mutex};

use tokslides_render_engine::CameraFrame;
use tracing::{debug, info, warn};

use crate::devices::{CameraSource, DeviceInfo, Lease, MediaDevices};
use crate::notice::Notice;

/// Single-frame mailbox between a camera reader and the composition loop.
///
/// Writers replace the frame; readers always see the newest one. An empty
/// slot means the camera has not decoded a frame yet.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    latest: Arc<Mutex<Option<Arc<CameraFrame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: CameraFrame) {
        *self.lock() = Some(Arc::new(frame));
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn latest(&self) -> Option<Arc<CameraFrame>> {
        self.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<CameraFrame>>> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns at most one camera stream at a time.
pub struct CameraManager {
    devices: Arc<dyn MediaDevices>,
    slot: FrameSlot,
    device: Option<String>,
    stream: Option<Lease<Box<dyn CameraSource>>>,
}

impl CameraManager {
    pub fn new(devices: Arc<dyn MediaDevices>, slot: FrameSlot) -> Self {
        Self {
            devices,
            slot,
            device: None,
            stream: None,
        }
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    pub fn slot(&self) -> FrameSlot {
        self.slot.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Start the camera. A failure leaves it off and is returned as a
    /// blocking notice.
    pub async fn enable(&mut self) -> Result<(), Notice> {
        if self.stream.is_some() {
            return Ok(());
        }
        match self
            .devices
            .acquire_camera(self.device.as_deref(), self.slot.clone())
            .await
        {
            Ok(source) => {
                info!(device = source.device_id(), label = source.label(), "Camera started");
                self.stream = Some(Lease::new(source));
                Ok(())
            }
            Err(e) => {
                warn!(device = ?self.device, error = %e, "Camera could not be started");
                self.slot.clear();
                Err(Notice::camera_unavailable(&e))
            }
        }
    }

    /// Stop every track of the current stream and drop the last frame.
    pub fn disable(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(device = stream.device_id(), "Stopping camera");
            stream.release();
        }
        self.slot.clear();
    }

    /// Flip the camera on or off, returning the new state.
    pub async fn toggle(&mut self) -> Result<bool, Notice> {
        if self.is_enabled() {
            self.disable();
            Ok(false)
        } else {
            self.enable().await.map(|()| true)
        }
    }

    /// Switch devices. The old stream is fully stopped before the new one is
    /// opened.
    pub async fn select_device(&mut self, device: impl Into<String>) -> Result<(), Notice> {
        self.device = Some(device.into());
        if !self.is_enabled() {
            return Ok(());
        }
        self.disable();
        self.enable().await
    }

    /// Available cameras; enumeration failures yield an empty list.
    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.enumerate_cameras().await.unwrap_or_else(|e| {
            warn!(error = %e, "Camera enumeration failed");
            Vec::new()
        })
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevices;
    use tokslides_render_engine::blank_pixmap;

    #[test]
    fn test_slot_keeps_latest() {
        let slot = FrameSlot::new();
        assert!(!slot.is_ready());
        slot.publish(CameraFrame::from_pixmap(blank_pixmap(2, 2), 1.0));
        slot.publish(CameraFrame::from_pixmap(blank_pixmap(4, 4), 2.0));
        assert_eq!(slot.latest().map(|f| f.timestamp_ms()), Some(2.0));
        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[tokio::test]
    async fn test_toggle_releases_stream() {
        let devices = FakeDevices::new();
        let mut camera = CameraManager::new(devices.clone(), FrameSlot::new());
        assert_eq!(camera.toggle().await, Ok(true));
        assert_eq!(devices.live_cameras(), 1);
        assert!(camera.slot().is_ready());

        assert_eq!(camera.toggle().await, Ok(false));
        assert_eq!(devices.live_cameras(), 0);
        assert!(!camera.slot().is_ready());
    }

    #[tokio::test]
    async fn test_select_device_never_holds_two_streams() {
        let devices = FakeDevices::new();
        let mut camera = CameraManager::new(devices.clone(), FrameSlot::new());
        camera.enable().await.unwrap();
        camera.select_device("cam-2").await.unwrap();
        assert_eq!(devices.max_live_cameras(), 1);
        assert_eq!(devices.live_cameras(), 1);
        assert_eq!(camera.device(), Some("cam-2"));
    }

    #[tokio::test]
    async fn test_denied_camera_stays_off() {
        let devices = FakeDevices::new().deny_camera();
        let mut camera = CameraManager::new(devices.clone(), FrameSlot::new());
        let notice = camera.enable().await.unwrap_err();
        assert_eq!(notice.level, crate::notice::NoticeLevel::Blocking);
        assert!(!camera.is_enabled());
        assert_eq!(devices.live_cameras(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let devices = FakeDevices::new();
        {
            let mut camera = CameraManager::new(devices.clone(), FrameSlot::new());
            camera.enable().await.unwrap();
        }
        assert_eq!(devices.live_cameras(), 0);
    }
}
