//! A fixed-rate video stream read from the output surface, optionally
//! carrying a microphone track.

use tokslides_common::{TokslidesError, TokslidesResult};
use tracing::{debug, info};

use crate::devices::{AudioSource, AudioTrack, Lease};
use crate::surface::OutputSurface;

pub struct CaptureStream {
    surface: OutputSurface,
    fps: u32,
    audio: Option<Lease<Box<dyn AudioTrack>>>,
}

impl CaptureStream {
    /// Capture `surface` at `fps` frames per second.
    pub fn from_surface(surface: Option<&OutputSurface>, fps: u32) -> TokslidesResult<Self> {
        let surface = surface
            .cloned()
            .ok_or_else(|| TokslidesError::capture("output surface is not available"))?;
        if fps == 0 {
            return Err(TokslidesError::capture("capture rate must be at least 1 fps"));
        }
        debug!(fps, width = surface.width(), height = surface.height(), "Capture stream created");
        Ok(Self {
            surface,
            fps,
            audio: None,
        })
    }

    /// Attach a microphone track. The stream owns it from here on and
    /// releases it when dropped.
    pub fn add_audio_track(&mut self, track: Lease<Box<dyn AudioTrack>>) {
        info!(label = track.label(), "Microphone attached to capture stream");
        self.audio = Some(track);
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn audio_source(&self) -> Option<AudioSource> {
        self.audio.as_ref().map(|track| track.source())
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Copy the latest composited frame into `buf`.
    pub fn read_frame(&self, buf: &mut Vec<u8>) {
        self.surface.read_into(buf);
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("fps", &self.fps)
            .field("has_audio", &self.has_audio())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevices;
    use crate::devices::MediaDevices;

    #[test]
    fn test_missing_surface_is_an_error() {
        let err = CaptureStream::from_surface(None, 30).unwrap_err();
        assert!(matches!(err, TokslidesError::Capture { .. }));
    }

    #[test]
    fn test_zero_fps_is_an_error() {
        let surface = OutputSurface::new(4, 4);
        assert!(CaptureStream::from_surface(Some(&surface), 0).is_err());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_microphone() {
        let devices = FakeDevices::new();
        let track = devices.acquire_microphone().await.unwrap();
        let surface = OutputSurface::new(4, 4);
        let mut stream = CaptureStream::from_surface(Some(&surface), 30).unwrap();
        stream.add_audio_track(Lease::new(track));
        assert!(stream.has_audio());
        assert_eq!(devices.live_microphones(), 1);
        assert_eq!(stream.audio_source().map(|s| s.format), Some("lavfi".to_string()));

        drop(stream);
        assert_eq!(devices.live_microphones(), 0);
    }

    #[test]
    fn test_read_frame_copies_surface() {
        let surface = OutputSurface::new(3, 2);
        let stream = CaptureStream::from_surface(Some(&surface), 30).unwrap();
        let mut buf = Vec::new();
        stream.read_frame(&mut buf);
        assert_eq!(buf.len(), 3 * 2 * 4);
        assert_eq!((stream.width(), stream.height()), (3, 2));
    }
}
