//! Recording session controller.
//!
//! One tokio task owns the session state and walks it through
//! `idle → countdown → recording → finalizing → idle`. Callers talk to it
//! through a [`SessionHandle`] and observe it through the phase watch and
//! the event stream.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokslides_common::config::RecordingDefaults;
use tokslides_common::{unix_millis, TokslidesError};
use tracing::{debug, error, info, warn};

use crate::camera::FrameSlot;
use crate::devices::{AudioTrack, Lease, MediaDevices};
use crate::download::{recording_file_name, DownloadSink, SavedRecording, RECORDING_MIME};
use crate::encoder::{ChunkBuffer, EncoderConfig, EncoderFactory, Recorder, RecorderState, RecordingStats};
use crate::notice::Notice;
use crate::placement::PlacementHandle;
use crate::scheduler::{CompositionLoop, LoopInputs};
use crate::segmentation::Segmenter;
use crate::stage::SlideStage;
use crate::stream::CaptureStream;
use crate::surface::OutputSurface;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub fps: u32,
    pub refresh_hz: u32,
    pub countdown_secs: u8,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

impl From<&RecordingDefaults> for SessionConfig {
    fn from(defaults: &RecordingDefaults) -> Self {
        Self {
            fps: defaults.fps,
            refresh_hz: defaults.refresh_hz,
            countdown_secs: defaults.countdown_secs,
            video_bitrate_kbps: defaults.video_bitrate_kbps,
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&RecordingDefaults::default())
    }
}

/// Collaborators a session runs against.
pub struct SessionDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub stage: SlideStage,
    pub camera: FrameSlot,
    pub placement: PlacementHandle,
    /// The output frame surface. Recording aborts when it is missing.
    pub surface: Option<OutputSurface>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub downloads: Arc<dyn DownloadSink>,
    pub segmenter: Option<Box<dyn Segmenter>>,
}

/// Observable phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Countdown { remaining: u8 },
    Recording,
    Finalizing,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The preview should switch into (or out of) full-preview mode.
    PreviewMode(bool),
    Notice(Notice),
    /// Seconds left on the countdown, from the configured length down to 1.
    Countdown(u8),
    CountdownGo,
    RecordingStarted { has_audio: bool },
    Saved(SavedRecording),
    Aborted { reason: String },
}

enum Command {
    Record(oneshot::Sender<bool>),
    Stop(oneshot::Sender<Option<SavedRecording>>),
}

/// Caller side of a running session.
///
/// Dropping the handle tears the session down in the background: a
/// countdown is cancelled and its microphone released, a recording is
/// finalized and saved.
pub struct SessionHandle {
    commands: Option<mpsc::UnboundedSender<Command>>,
    phase: watch::Receiver<SessionPhase>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Start the controller task. Must be called inside a tokio runtime.
    pub fn spawn(config: SessionConfig, deps: SessionDeps) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);

        let composition = deps.surface.clone().map(|surface| {
            let inputs = LoopInputs {
                snapshots: deps.stage.snapshots(),
                camera: deps.camera.clone(),
                placement: deps.placement.clone(),
                surface,
            };
            let composition = CompositionLoop::new(inputs, config.refresh_hz);
            match deps.segmenter {
                Some(segmenter) => composition.with_segmenter(segmenter),
                None => composition,
            }
        });

        let controller = Controller {
            config,
            devices: deps.devices,
            stage: deps.stage,
            surface: deps.surface,
            encoders: deps.encoders,
            downloads: deps.downloads,
            composition,
            state: SessionState::Idle,
            phase: phase_tx,
            events: event_tx,
        };
        let task = tokio::spawn(controller.run(command_rx));

        Self {
            commands: Some(command_tx),
            phase: phase_rx,
            events: Some(event_rx),
            task: Some(task),
        }
    }

    /// Begin a countdown. Returns `false` when a session is already active.
    ///
    /// Resolves once the microphone request has settled and the countdown
    /// is running.
    pub async fn record(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Record(tx)) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop an active recording and wait for it to be saved. A no-op
    /// returning `None` unless the encoder is actively recording.
    pub async fn stop(&self) -> Option<SavedRecording> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Stop(tx)) {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    /// The event stream. Only the first call returns it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Tear down and wait for the controller task to exit.
    pub async fn shutdown(mut self) {
        self.commands.take();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Session task failed");
            }
        }
    }

    fn send(&self, command: Command) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|commands| commands.send(command).is_ok())
    }
}

struct ActiveRecording {
    recorder: Recorder,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: ChunkBuffer,
    has_audio: bool,
}

enum SessionState {
    Idle,
    Countdown {
        remaining: u8,
        deadline: Instant,
        microphone: Option<Lease<Box<dyn AudioTrack>>>,
    },
    Recording(ActiveRecording),
    Finalizing,
}

enum Wake {
    Command(Option<Command>),
    CountdownTick,
    Chunk(Vec<u8>),
    RecorderInactive,
}

struct Controller {
    config: SessionConfig,
    devices: Arc<dyn MediaDevices>,
    stage: SlideStage,
    surface: Option<OutputSurface>,
    encoders: Arc<dyn EncoderFactory>,
    downloads: Arc<dyn DownloadSink>,
    composition: Option<CompositionLoop>,
    state: SessionState,
    phase: watch::Sender<SessionPhase>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = match &mut self.state {
                SessionState::Countdown { deadline, .. } => {
                    let deadline = *deadline;
                    tokio::select! {
                        command = commands.recv() => Wake::Command(command),
                        _ = tokio::time::sleep_until(deadline) => Wake::CountdownTick,
                    }
                }
                SessionState::Recording(active) => {
                    tokio::select! {
                        biased;
                        command = commands.recv() => Wake::Command(command),
                        Some(chunk) = active.chunks.recv() => Wake::Chunk(chunk),
                        _ = active.recorder.inactive() => Wake::RecorderInactive,
                    }
                }
                _ => Wake::Command(commands.recv().await),
            };

            match wake {
                Wake::Command(Some(Command::Record(reply))) => {
                    let started = self.record().await;
                    let _ = reply.send(started);
                }
                Wake::Command(Some(Command::Stop(reply))) => {
                    let saved = self.stop().await;
                    let _ = reply.send(saved);
                }
                Wake::Command(None) => break,
                Wake::CountdownTick => self.countdown_tick().await,
                Wake::Chunk(chunk) => {
                    if let SessionState::Recording(active) = &mut self.state {
                        active.buffer.push(chunk);
                    }
                }
                Wake::RecorderInactive => {
                    warn!("Encoder stopped on its own, finalizing");
                    self.finalize().await;
                }
            }
        }
        self.teardown().await;
    }

    async fn record(&mut self) -> bool {
        if !matches!(self.state, SessionState::Idle) {
            debug!(phase = ?*self.phase.borrow(), "Record ignored, session already active");
            return false;
        }
        let countdown = self.config.countdown_secs;
        self.emit(SessionEvent::PreviewMode(true));
        self.state = SessionState::Countdown {
            remaining: countdown,
            deadline: Instant::now() + COUNTDOWN_TICK,
            microphone: None,
        };
        self.set_phase(SessionPhase::Countdown {
            remaining: countdown,
        });

        let microphone = match self.devices.acquire_microphone().await {
            Ok(track) => {
                info!(label = track.label(), "Microphone acquired");
                Some(Lease::new(track))
            }
            Err(e) => {
                warn!(error = %e, "Microphone unavailable, recording video only");
                self.emit(SessionEvent::Notice(Notice::microphone_unavailable(&e)));
                None
            }
        };

        if countdown == 0 {
            self.state = SessionState::Idle;
            self.emit(SessionEvent::CountdownGo);
            self.start_recording(microphone).await;
            return true;
        }

        // The countdown starts once the microphone request has settled.
        self.state = SessionState::Countdown {
            remaining: countdown,
            deadline: Instant::now() + COUNTDOWN_TICK,
            microphone,
        };
        self.emit(SessionEvent::Countdown(countdown));
        info!(seconds = countdown, "Countdown started");
        true
    }

    async fn countdown_tick(&mut self) {
        let SessionState::Countdown {
            remaining,
            deadline,
            ..
        } = &mut self.state
        else {
            return;
        };
        if *remaining > 1 {
            *remaining -= 1;
            *deadline += COUNTDOWN_TICK;
            let remaining = *remaining;
            self.set_phase(SessionPhase::Countdown { remaining });
            self.emit(SessionEvent::Countdown(remaining));
            return;
        }

        let SessionState::Countdown { microphone, .. } =
            std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            return;
        };
        self.emit(SessionEvent::CountdownGo);
        self.start_recording(microphone).await;
    }

    async fn start_recording(&mut self, microphone: Option<Lease<Box<dyn AudioTrack>>>) {
        // The first composited frame must show the current slide.
        let snapshot = self.stage.rasterize_now().await;
        debug!(degraded = snapshot.is_degraded(), "Forced snapshot before recording");

        // Draws the first frame before the recorder reads the surface.
        if let Some(composition) = self.composition.as_mut() {
            composition.start();
        }

        let mut stream = match CaptureStream::from_surface(self.surface.as_ref(), self.config.fps) {
            Ok(stream) => stream,
            Err(e) => {
                drop(microphone);
                self.abort("Recording failed: the preview surface is not available.", e);
                return;
            }
        };
        let has_audio = microphone.is_some();
        if let Some(microphone) = microphone {
            stream.add_audio_track(microphone);
        }

        let config = EncoderConfig::for_stream(
            &stream,
            self.config.video_bitrate_kbps,
            self.config.audio_bitrate_kbps,
        );
        let started = self
            .encoders
            .create(&config)
            .and_then(|backend| Recorder::start(stream, backend, config));
        let (recorder, chunks) = match started {
            Ok(started) => started,
            Err(e) => {
                self.abort("Recording failed: the encoder could not be started.", e);
                return;
            }
        };

        info!(backend = recorder.backend(), has_audio, "Recording started");
        self.state = SessionState::Recording(ActiveRecording {
            recorder,
            chunks,
            buffer: ChunkBuffer::new(),
            has_audio,
        });
        self.set_phase(SessionPhase::Recording);
        self.emit(SessionEvent::RecordingStarted { has_audio });
    }

    /// Give up on the recording attempt and return to idle.
    fn abort(&mut self, message: &str, err: TokslidesError) {
        error!(error = %err, "Recording aborted");
        if let Some(composition) = self.composition.as_mut() {
            composition.stop();
        }
        self.state = SessionState::Idle;
        self.set_phase(SessionPhase::Idle);
        self.emit(SessionEvent::Notice(Notice::error(message)));
        self.emit(SessionEvent::Aborted {
            reason: err.to_string(),
        });
        self.emit(SessionEvent::PreviewMode(false));
    }

    async fn stop(&mut self) -> Option<SavedRecording> {
        match &self.state {
            SessionState::Recording(active)
                if active.recorder.state() == RecorderState::Recording => {}
            _ => {
                debug!("Stop ignored, not recording");
                return None;
            }
        }
        self.finalize().await
    }

    async fn finalize(&mut self) -> Option<SavedRecording> {
        let SessionState::Recording(mut active) =
            std::mem::replace(&mut self.state, SessionState::Finalizing)
        else {
            return None;
        };
        self.set_phase(SessionPhase::Finalizing);

        // Resolves after the last chunk was sent and the microphone released.
        let outcome = active.recorder.stop().await;
        while let Ok(chunk) = active.chunks.try_recv() {
            active.buffer.push(chunk);
        }
        if let Some(composition) = self.composition.as_mut() {
            composition.stop();
        }
        self.emit(SessionEvent::PreviewMode(false));

        let stats = match outcome {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Encoder failed");
                self.emit(SessionEvent::Notice(Notice::error(
                    "Recording stopped unexpectedly. Saving what was captured.",
                )));
                RecordingStats {
                    frames: 0,
                    duration_ms: 0,
                }
            }
        };

        let saved = if active.buffer.is_empty() {
            self.emit(SessionEvent::Notice(Notice::error(
                "Nothing was recorded, no file was saved.",
            )));
            None
        } else {
            self.save(active.buffer, active.has_audio, stats).await
        };

        self.state = SessionState::Idle;
        self.set_phase(SessionPhase::Idle);
        if let Some(saved) = &saved {
            self.emit(SessionEvent::Saved(saved.clone()));
        }
        saved
    }

    async fn save(
        &self,
        buffer: ChunkBuffer,
        has_audio: bool,
        stats: RecordingStats,
    ) -> Option<SavedRecording> {
        let chunk_count = buffer.len();
        let data = buffer.assemble();
        let bytes = data.len() as u64;
        let file_name = recording_file_name(unix_millis());

        let downloads = self.downloads.clone();
        let name = file_name.clone();
        let result = tokio::task::spawn_blocking(move || downloads.save(&name, &data)).await;
        let location = match result {
            Ok(Ok(location)) => location,
            Ok(Err(e)) => {
                error!(error = %e, file = %file_name, "Saving recording failed");
                self.emit(SessionEvent::Notice(Notice::error(
                    "The recording could not be saved.",
                )));
                return None;
            }
            Err(e) => {
                error!(error = %e, "Save task failed");
                self.emit(SessionEvent::Notice(Notice::error(
                    "The recording could not be saved.",
                )));
                return None;
            }
        };

        info!(file = %file_name, bytes, chunks = chunk_count, frames = stats.frames, "Recording finalized");
        Some(SavedRecording {
            file_name,
            location,
            bytes,
            mime: RECORDING_MIME.to_string(),
            has_audio,
            frames: stats.frames,
            duration_ms: stats.duration_ms,
        })
    }

    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Countdown { microphone, .. } => {
                drop(microphone);
                info!("Countdown cancelled by teardown");
                self.emit(SessionEvent::PreviewMode(false));
            }
            SessionState::Recording(active) => {
                self.state = SessionState::Recording(active);
                info!("Finalizing recording on teardown");
                self.finalize().await;
            }
            SessionState::Idle | SessionState::Finalizing => {}
        }
        if let Some(composition) = self.composition.as_mut() {
            composition.stop();
        }
        self.set_phase(SessionPhase::Idle);
        debug!("Session controller exited");
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.fps, 30);
        assert_eq!(config.refresh_hz, 60);
        assert_eq!(config.countdown_secs, 3);
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let json = serde_json::to_string(&SessionPhase::Countdown { remaining: 2 }).unwrap();
        assert_eq!(json, r#"{"phase":"countdown","remaining":2}"#);
        let json = serde_json::to_string(&SessionPhase::Idle).unwrap();
        assert_eq!(json, r#"{"phase":"idle"}"#);
    }
}
