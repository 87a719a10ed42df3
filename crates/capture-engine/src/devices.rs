//! Hardware media sources and their leases.
//!
//! Every camera stream and microphone track is held through a [`Lease`],
//! which releases the underlying device when it goes out of scope. Early
//! returns, task cancellation and panics all release the device the same
//! way an explicit [`Lease::release`] does.

use std::ops::Deref;

use async_trait::async_trait;
use serde::Serialize;
use tokslides_common::TokslidesResult;

use crate::camera::FrameSlot;

/// A device handle that must be given back.
pub trait Release: Send {
    /// Stop the device. Must be idempotent.
    fn release(&mut self);

    fn is_live(&self) -> bool;
}

impl<T: Release + ?Sized> Release for Box<T> {
    fn release(&mut self) {
        (**self).release()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }
}

/// Scoped ownership of a [`Release`] handle.
#[derive(Debug)]
pub struct Lease<T: Release> {
    handle: T,
    released: bool,
}

impl<T: Release> Lease<T> {
    pub fn new(handle: T) -> Self {
        Self {
            handle,
            released: false,
        }
    }

    /// Release now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.handle.release();
        }
    }
}

impl<T: Release> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T: Release> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// How an encoder can open the same audio input as a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    /// Capture backend name as understood by ffmpeg (`pulse`, `avfoundation`, `dshow`).
    pub format: String,
    pub device: String,
}

/// A live microphone track.
pub trait AudioTrack: Release + Sync {
    fn label(&self) -> &str;

    fn source(&self) -> AudioSource;
}

/// A live camera stream delivering frames into a [`FrameSlot`].
pub trait CameraSource: Release + Sync {
    fn label(&self) -> &str;

    fn device_id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// Permission-gated access to capture hardware.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire_microphone(&self) -> TokslidesResult<Box<dyn AudioTrack>>;

    /// Open a camera and stream its frames into `slot`. `None` picks the
    /// default device.
    async fn acquire_camera(
        &self,
        device: Option<&str>,
        slot: FrameSlot,
    ) -> TokslidesResult<Box<dyn CameraSource>>;

    async fn enumerate_cameras(&self) -> TokslidesResult<Vec<DeviceInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>, bool);

    impl Release for Counted {
        fn release(&mut self) {
            if self.1 {
                self.0.fetch_add(1, Ordering::SeqCst);
                self.1 = false;
            }
        }

        fn is_live(&self) -> bool {
            self.1
        }
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let lease = Lease::new(Counted(released.clone(), true));
            assert!(lease.is_live());
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let lease = Lease::new(Counted(released.clone(), true));
        lease.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_boxed_handles_release_through_the_box() {
        let released = Arc::new(AtomicUsize::new(0));
        let boxed: Box<dyn Release> = Box::new(Counted(released.clone(), true));
        drop(Lease::new(boxed));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
