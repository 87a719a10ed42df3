//! Composition loop: one composite per display refresh while running.
//!
//! Every tick reads the snapshot cell, the camera slot and the placement
//! handle afresh, so changes made between ticks show up on the next frame.
//! Ticks are paced on the runtime timer and drawn on the blocking pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokslides_render_engine::{CameraLayer, CompositeReport, FrameCompositor};
use tracing::{debug, info, warn};

use crate::camera::FrameSlot;
use crate::placement::PlacementHandle;
use crate::segmentation::Segmenter;
use crate::stage::SnapshotCell;
use crate::surface::OutputSurface;

/// Live references read on every tick.
#[derive(Debug, Clone)]
pub struct LoopInputs {
    pub snapshots: SnapshotCell,
    pub camera: FrameSlot,
    pub placement: PlacementHandle,
    pub surface: OutputSurface,
}

#[derive(Default)]
struct SegmenterSlot {
    segmenter: Option<Box<dyn Segmenter>>,
    ready: bool,
}

impl Drop for SegmenterSlot {
    fn drop(&mut self) {
        if let Some(segmenter) = self.segmenter.as_mut() {
            segmenter.dispose();
        }
    }
}

/// Draw state owned by whichever task is ticking.
struct Tick {
    inputs: LoopInputs,
    compositor: FrameCompositor,
    segmenter: Arc<Mutex<SegmenterSlot>>,
}

impl Tick {
    fn run(&mut self) -> CompositeReport {
        let slide = self.inputs.snapshots.current();
        let camera = self.inputs.camera.latest();
        let placement = self.inputs.placement.get();

        let mask = match camera.as_deref() {
            Some(frame) => {
                let mut slot = self
                    .segmenter
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let ready = slot.ready;
                match slot.segmenter.as_mut() {
                    Some(segmenter) if ready => segmenter.segment_frame(frame, frame.timestamp_ms()),
                    _ => None,
                }
            }
            None => None,
        };
        let layer = camera.as_deref().map(|frame| CameraLayer {
            frame,
            mask: mask.as_ref(),
        });

        let compositor = &mut self.compositor;
        self.inputs
            .surface
            .draw(|target| compositor.composite_frame(target, slide.as_deref(), layer, &placement))
    }
}

/// `stopped → running → stopped` driver of the frame compositor.
pub struct CompositionLoop {
    inputs: LoopInputs,
    period: Duration,
    segmenter: Arc<Mutex<SegmenterSlot>>,
    task: Option<JoinHandle<()>>,
    /// Open while running. A tick draws only while holding it open.
    gate: Arc<Mutex<bool>>,
}

impl CompositionLoop {
    pub fn new(inputs: LoopInputs, refresh_hz: u32) -> Self {
        Self {
            inputs,
            period: Duration::from_nanos(1_000_000_000 / refresh_hz.max(1) as u64),
            segmenter: Arc::default(),
            task: None,
            gate: Arc::default(),
        }
    }

    pub fn with_segmenter(self, segmenter: Box<dyn Segmenter>) -> Self {
        if let Ok(mut slot) = self.segmenter.lock() {
            slot.segmenter = Some(segmenter);
            slot.ready = false;
        }
        self
    }

    pub fn inputs(&self) -> &LoopInputs {
        &self.inputs
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start ticking. Returns `false` when the loop was already running.
    ///
    /// The first frame is drawn before this returns, so a reader of the
    /// surface never sees the blank initial frame once the loop has started.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("Composition loop already running");
            return false;
        }
        self.prepare_segmenter();

        let mut tick = self.tick_state();
        tick.run();

        let gate = Arc::new(Mutex::new(true));
        self.gate = gate.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The immediate first tick was drawn inline above.
            interval.tick().await;
            loop {
                interval.tick().await;
                let gate = gate.clone();
                let drawn = tokio::task::spawn_blocking(move || {
                    let open = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    if *open {
                        tick.run();
                    }
                    tick
                })
                .await;
                match drawn {
                    Ok(next) => tick = next,
                    Err(e) => {
                        warn!(error = %e, "Composition tick failed, loop stopped");
                        break;
                    }
                }
            }
        }));
        info!(period_ms = period.as_secs_f64() * 1000.0, "Composition loop started");
        true
    }

    /// Cancel the pending tick. Returns `false` when nothing was running.
    ///
    /// A tick already drawing finishes first; no frame is drawn after this
    /// returns.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                *self
                    .gate
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = false;
                task.abort();
                info!(frames = self.inputs.surface.frames_drawn(), "Composition loop stopped");
                true
            }
            None => false,
        }
    }

    /// Composite one frame on the caller's thread.
    pub fn composite_once(&self) -> CompositeReport {
        self.tick_state().run()
    }

    fn tick_state(&self) -> Tick {
        Tick {
            inputs: self.inputs.clone(),
            compositor: FrameCompositor::new(),
            segmenter: self.segmenter.clone(),
        }
    }

    fn prepare_segmenter(&self) {
        let mut slot = self
            .segmenter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.ready {
            return;
        }
        let Some(segmenter) = slot.segmenter.as_mut() else {
            return;
        };
        if segmenter.initialize() {
            slot.ready = true;
            info!("Background segmentation enabled");
        } else {
            warn!("Segmenter failed to initialize, camera drawn without keying");
            if let Some(mut failed) = slot.segmenter.take() {
                failed.dispose();
            }
        }
    }
}

impl Drop for CompositionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
