//! The output frame buffer shared by the composition loop (writer) and the
//! capture stream (reader).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokslides_render_engine::{blank_pixmap, Pixmap, CANVAS_HEIGHT, CANVAS_WIDTH};

#[derive(Debug, Clone)]
pub struct OutputSurface {
    frame: Arc<Mutex<Pixmap>>,
    frames_drawn: Arc<AtomicU64>,
}

impl OutputSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: Arc::new(Mutex::new(blank_pixmap(width, height))),
            frames_drawn: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 1080×1920 output canvas.
    pub fn canvas() -> Self {
        Self::new(CANVAS_WIDTH, CANVAS_HEIGHT)
    }

    pub fn width(&self) -> u32 {
        self.lock().width()
    }

    pub fn height(&self) -> u32 {
        self.lock().height()
    }

    /// Draw a new frame in place.
    pub fn draw<R>(&self, f: impl FnOnce(&mut Pixmap) -> R) -> R {
        let out = f(&mut self.lock());
        self.frames_drawn.fetch_add(1, Ordering::Relaxed);
        out
    }

    /// Copy the current frame's RGBA bytes into `buf`, resizing it as needed.
    ///
    /// Composited frames are opaque, so premultiplied and straight alpha
    /// bytes are identical.
    pub fn read_into(&self, buf: &mut Vec<u8>) {
        let frame = self.lock();
        buf.clear();
        buf.extend_from_slice(frame.data());
    }

    pub fn with_frame<R>(&self, f: impl FnOnce(&Pixmap) -> R) -> R {
        f(&self.lock())
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Pixmap> {
        self.frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokslides_render_engine::Color;

    #[test]
    fn test_draw_then_read() {
        let surface = OutputSurface::new(2, 1);
        surface.draw(|p| p.fill(Color::from_rgba8(1, 2, 3, 255)));
        let mut buf = Vec::new();
        surface.read_into(&mut buf);
        assert_eq!(buf, vec![1, 2, 3, 255, 1, 2, 3, 255]);
        assert_eq!(surface.frames_drawn(), 1);
    }
}
