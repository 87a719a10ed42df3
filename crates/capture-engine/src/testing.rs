//! In-process device doubles for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokslides_common::{TokslidesError, TokslidesResult};
use tokslides_render_engine::{blank_pixmap, CameraFrame, Color};

use crate::camera::FrameSlot;
use crate::devices::{AudioSource, AudioTrack, CameraSource, DeviceInfo, MediaDevices, Release};

/// Media devices that always succeed unless told to deny access, and count
/// how many handles are live.
#[derive(Debug, Default)]
pub struct FakeDevices {
    deny_microphone: AtomicBool,
    deny_camera: AtomicBool,
    live_microphones: Arc<AtomicUsize>,
    microphones_acquired: AtomicUsize,
    live_cameras: Arc<AtomicUsize>,
    max_live_cameras: Arc<AtomicUsize>,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny_microphone(self: Arc<Self>) -> Arc<Self> {
        self.deny_microphone.store(true, Ordering::SeqCst);
        self
    }

    pub fn deny_camera(self: Arc<Self>) -> Arc<Self> {
        self.deny_camera.store(true, Ordering::SeqCst);
        self
    }

    pub fn live_microphones(&self) -> usize {
        self.live_microphones.load(Ordering::SeqCst)
    }

    pub fn microphones_acquired(&self) -> usize {
        self.microphones_acquired.load(Ordering::SeqCst)
    }

    pub fn live_cameras(&self) -> usize {
        self.live_cameras.load(Ordering::SeqCst)
    }

    pub fn max_live_cameras(&self) -> usize {
        self.max_live_cameras.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire_microphone(&self) -> TokslidesResult<Box<dyn AudioTrack>> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(TokslidesError::permission_denied("microphone blocked"));
        }
        self.microphones_acquired.fetch_add(1, Ordering::SeqCst);
        self.live_microphones.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone {
            live: Some(self.live_microphones.clone()),
        }))
    }

    async fn acquire_camera(
        &self,
        device: Option<&str>,
        slot: FrameSlot,
    ) -> TokslidesResult<Box<dyn CameraSource>> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(TokslidesError::permission_denied("camera blocked"));
        }
        let live = self.live_cameras.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_cameras.fetch_max(live, Ordering::SeqCst);

        let mut pixmap = blank_pixmap(64, 48);
        pixmap.fill(Color::from_rgba8(0, 200, 120, 255));
        slot.publish(CameraFrame::from_pixmap(pixmap, 0.0));

        Ok(Box::new(FakeCamera {
            device: device.unwrap_or("fake0").to_string(),
            live: Some(self.live_cameras.clone()),
        }))
    }

    async fn enumerate_cameras(&self) -> TokslidesResult<Vec<DeviceInfo>> {
        Ok(vec![
            DeviceInfo {
                id: "fake0".into(),
                label: "Fake Camera".into(),
            },
            DeviceInfo {
                id: "cam-2".into(),
                label: "Second Fake Camera".into(),
            },
        ])
    }
}

struct FakeMicrophone {
    live: Option<Arc<AtomicUsize>>,
}

impl Release for FakeMicrophone {
    fn release(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.is_some()
    }
}

impl AudioTrack for FakeMicrophone {
    fn label(&self) -> &str {
        "Fake Microphone"
    }

    fn source(&self) -> AudioSource {
        AudioSource {
            format: "lavfi".into(),
            device: "anullsrc".into(),
        }
    }
}

struct FakeCamera {
    device: String,
    live: Option<Arc<AtomicUsize>>,
}

impl Release for FakeCamera {
    fn release(&mut self) {
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.is_some()
    }
}

impl CameraSource for FakeCamera {
    fn label(&self) -> &str {
        "Fake Camera"
    }

    fn device_id(&self) -> &str {
        &self.device
    }
}
