//! Encoding a capture stream into ordered output chunks.
//!
//! A [`Recorder`] pulls frames from a [`CaptureStream`] at its frame rate on
//! a dedicated thread and hands them to an [`EncoderBackend`]. Whatever the
//! backend produces arrives, in order, on the chunk channel returned by
//! [`Recorder::start`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot, watch};
use tokslides_common::clock::{RateController, RecordingClock};
use tokslides_common::{TokslidesError, TokslidesResult};
use tracing::{debug, error, info, warn};

use crate::devices::AudioSource;
use crate::stream::CaptureStream;

const MAX_PUMP_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub audio: Option<AudioSource>,
}

impl EncoderConfig {
    pub fn for_stream(stream: &CaptureStream, video_bitrate_kbps: u32, audio_bitrate_kbps: u32) -> Self {
        Self {
            width: stream.width(),
            height: stream.height(),
            fps: stream.fps(),
            video_bitrate_kbps,
            audio_bitrate_kbps,
            audio: stream.audio_source(),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Where an encoder delivers output.
#[derive(Debug, Clone)]
pub struct ChunkSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChunkSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// Queue a chunk. Empty chunks are dropped. Returns `false` once the
    /// receiving side is gone.
    pub fn deliver(&self, chunk: Vec<u8>) -> bool {
        if chunk.is_empty() {
            return true;
        }
        self.tx.send(chunk).is_ok()
    }
}

/// Ordered collection of the chunks of one recording.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    total: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.total += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total
    }

    /// Concatenate everything in arrival order.
    pub fn assemble(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// A video (and optionally audio) encoder fed raw RGBA frames.
pub trait EncoderBackend: Send {
    fn name(&self) -> &'static str;

    fn begin(&mut self, config: &EncoderConfig, sink: ChunkSink) -> TokslidesResult<()>;

    /// Encode one tightly packed RGBA frame of `config.frame_len()` bytes.
    fn push_frame(&mut self, rgba: &[u8]) -> TokslidesResult<()>;

    /// Flush and deliver remaining output. Called once after the last frame.
    fn end(&mut self) -> TokslidesResult<()>;
}

pub trait EncoderFactory: Send + Sync {
    fn create(&self, config: &EncoderConfig) -> TokslidesResult<Box<dyn EncoderBackend>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordingStats {
    pub frames: u64,
    pub duration_ms: u64,
}

/// A running encode. Dropping it stops the pump without waiting.
pub struct Recorder {
    backend: &'static str,
    stop: Arc<AtomicBool>,
    state: watch::Receiver<RecorderState>,
    outcome: Option<oneshot::Receiver<TokslidesResult<RecordingStats>>>,
}

impl Recorder {
    /// Begin encoding `stream` with `backend`.
    ///
    /// The stream moves into the pump thread and is dropped there when the
    /// recording ends, which releases any attached microphone.
    pub fn start(
        stream: CaptureStream,
        mut backend: Box<dyn EncoderBackend>,
        config: EncoderConfig,
    ) -> TokslidesResult<(Self, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        backend.begin(&config, ChunkSink::new(chunk_tx))?;

        let name = backend.name();
        let stop = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(RecorderState::Recording);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let pump_stop = stop.clone();
        std::thread::Builder::new()
            .name("tokslides-recorder".into())
            .spawn(move || {
                let outcome = pump(&stream, backend.as_mut(), &pump_stop);
                drop(backend);
                drop(stream);
                state_tx.send_replace(RecorderState::Inactive);
                let _ = outcome_tx.send(outcome);
            })
            .map_err(|e| TokslidesError::encode(format!("failed to spawn recorder thread: {e}")))?;

        info!(
            backend = name,
            width = config.width,
            height = config.height,
            fps = config.fps,
            audio = config.audio.is_some(),
            "Recorder started"
        );
        Ok((
            Self {
                backend: name,
                stop,
                state: state_rx,
                outcome: Some(outcome_rx),
            },
            chunk_rx,
        ))
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn state(&self) -> RecorderState {
        *self.state.borrow()
    }

    /// Resolves once the recorder is no longer recording, whether stopped
    /// or failed.
    pub async fn inactive(&mut self) {
        let _ = self
            .state
            .wait_for(|state| *state == RecorderState::Inactive)
            .await;
    }

    /// Stop, flush the encoder and wait for the last chunk to be delivered.
    pub async fn stop(&mut self) -> TokslidesResult<RecordingStats> {
        self.stop.store(true, Ordering::SeqCst);
        let outcome = self
            .outcome
            .take()
            .ok_or_else(|| TokslidesError::invalid_state("recorder already stopped"))?;
        outcome
            .await
            .map_err(|_| TokslidesError::encode("recorder thread exited without a result"))?
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn pump(
    stream: &CaptureStream,
    backend: &mut dyn EncoderBackend,
    stop: &AtomicBool,
) -> TokslidesResult<RecordingStats> {
    let clock = RecordingClock::start();
    let mut rate = RateController::new(stream.fps());
    let mut frame = Vec::new();
    let mut frames = 0u64;
    let mut failure = None;

    while !stop.load(Ordering::SeqCst) {
        let now = clock.elapsed_ns();
        if !rate.should_tick(now) {
            std::thread::sleep(rate.until_next(now).min(MAX_PUMP_SLEEP));
            continue;
        }
        stream.read_frame(&mut frame);
        if let Err(e) = backend.push_frame(&frame) {
            error!(error = %e, frames, "Encoder rejected frame, stopping");
            failure = Some(e);
            break;
        }
        frames += 1;
    }

    let ended = backend.end();
    let stats = RecordingStats {
        frames,
        duration_ms: clock.elapsed_ms() as u64,
    };
    if let Some(e) = failure {
        return Err(e);
    }
    ended?;
    debug!(frames = stats.frames, duration_ms = stats.duration_ms, "Recorder pump finished");
    Ok(stats)
}

/// Counters shared between a [`MemoryEncoder`] and whoever built it.
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    frames: Arc<AtomicU64>,
    with_audio: Arc<AtomicBool>,
    finished: Arc<AtomicU64>,
    first_frame: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryProbe {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn had_audio(&self) -> bool {
        self.with_audio.load(Ordering::SeqCst)
    }

    /// Number of encodes that were flushed.
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    /// RGBA bytes of the first frame pushed to any encoder from this probe.
    pub fn first_frame(&self) -> Option<Vec<u8>> {
        self.first_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Serialize)]
struct MemoryHeader<'a> {
    format: &'a str,
    width: u32,
    height: u32,
    fps: u32,
    audio: bool,
}

/// Encoder that emits a JSON header and a SHA-256 digest per frame.
///
/// Used for dry runs and tests where no ffmpeg is around.
#[derive(Debug)]
pub struct MemoryEncoder {
    probe: MemoryProbe,
    sink: Option<ChunkSink>,
    frame_len: usize,
    frames_per_chunk: u32,
    pending: Vec<u8>,
    pending_frames: u32,
}

impl MemoryEncoder {
    pub fn new(probe: MemoryProbe) -> Self {
        Self {
            probe,
            sink: None,
            frame_len: 0,
            frames_per_chunk: 1,
            pending: Vec::new(),
            pending_frames: 0,
        }
    }

    fn flush(&mut self) {
        if let Some(sink) = &self.sink {
            sink.deliver(std::mem::take(&mut self.pending));
        }
        self.pending_frames = 0;
    }
}

impl EncoderBackend for MemoryEncoder {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn begin(&mut self, config: &EncoderConfig, sink: ChunkSink) -> TokslidesResult<()> {
        let header = serde_json::to_vec(&MemoryHeader {
            format: "tokslides-digest",
            width: config.width,
            height: config.height,
            fps: config.fps,
            audio: config.audio.is_some(),
        })?;
        sink.deliver(header);
        self.probe
            .with_audio
            .store(config.audio.is_some(), Ordering::SeqCst);
        self.frame_len = config.frame_len();
        // One chunk per second of video.
        self.frames_per_chunk = config.fps.max(1);
        self.sink = Some(sink);
        Ok(())
    }

    fn push_frame(&mut self, rgba: &[u8]) -> TokslidesResult<()> {
        if rgba.len() != self.frame_len {
            return Err(TokslidesError::encode(format!(
                "frame of {} bytes, expected {}",
                rgba.len(),
                self.frame_len
            )));
        }
        self.pending.extend_from_slice(&Sha256::digest(rgba));
        if self.probe.frames.fetch_add(1, Ordering::SeqCst) == 0 {
            *self
                .probe
                .first_frame
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(rgba.to_vec());
        }
        self.pending_frames += 1;
        if self.pending_frames >= self.frames_per_chunk {
            self.flush();
        }
        Ok(())
    }

    fn end(&mut self) -> TokslidesResult<()> {
        self.flush();
        self.sink = None;
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds [`MemoryEncoder`]s that all report into one probe.
#[derive(Debug, Clone, Default)]
pub struct MemoryEncoderFactory {
    probe: MemoryProbe,
    refuse: bool,
}

impl MemoryEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose encoders can never be created.
    pub fn refusing() -> Self {
        Self {
            probe: MemoryProbe::default(),
            refuse: true,
        }
    }

    pub fn probe(&self) -> MemoryProbe {
        self.probe.clone()
    }
}

impl EncoderFactory for MemoryEncoderFactory {
    fn create(&self, _config: &EncoderConfig) -> TokslidesResult<Box<dyn EncoderBackend>> {
        if self.refuse {
            warn!("Memory encoder factory configured to refuse");
            return Err(TokslidesError::encode("encoder unavailable"));
        }
        Ok(Box::new(MemoryEncoder::new(self.probe.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::OutputSurface;

    fn stream(fps: u32) -> CaptureStream {
        let surface = OutputSurface::new(8, 8);
        CaptureStream::from_surface(Some(&surface), fps).unwrap()
    }

    #[test]
    fn test_chunk_buffer_skips_empty_and_keeps_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(vec![1, 2]);
        buffer.push(Vec::new());
        buffer.push(vec![3]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 3);
        assert_eq!(buffer.assemble(), vec![1, 2, 3]);
    }

    #[test]
    fn test_sink_drops_empty_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChunkSink::new(tx);
        assert!(sink.deliver(Vec::new()));
        assert!(sink.deliver(vec![7]));
        assert_eq!(rx.try_recv().unwrap(), vec![7]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_memory_encoder_rejects_wrong_frame_size() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut encoder = MemoryEncoder::new(MemoryProbe::default());
        let config = EncoderConfig::for_stream(&stream(30), 2500, 128);
        encoder.begin(&config, ChunkSink::new(tx)).unwrap();
        assert!(encoder.push_frame(&[0; 3]).is_err());
        assert!(encoder.push_frame(&vec![0; config.frame_len()]).is_ok());
    }

    #[tokio::test]
    async fn test_recorder_delivers_header_and_frames_in_order() {
        let factory = MemoryEncoderFactory::new();
        let probe = factory.probe();
        let stream = stream(30);
        let config = EncoderConfig::for_stream(&stream, 2500, 128);
        let backend = factory.create(&config).unwrap();
        let (mut recorder, mut chunks) = Recorder::start(stream, backend, config).unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let stats = recorder.stop().await.unwrap();
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert!(stats.frames >= 1);
        assert_eq!(stats.frames, probe.frames());
        assert_eq!(probe.finished(), 1);
        assert!(!probe.had_audio());

        let mut buffer = ChunkBuffer::new();
        while let Ok(chunk) = chunks.try_recv() {
            buffer.push(chunk);
        }
        let bytes = buffer.assemble();
        assert!(bytes.starts_with(b"{\"format\":\"tokslides-digest\""));
        let header_len = bytes.iter().position(|b| *b == b'}').unwrap() + 1;
        assert_eq!((bytes.len() - header_len) as u64, stats.frames * 32);
    }

    #[tokio::test]
    async fn test_second_stop_is_invalid() {
        let stream = stream(30);
        let config = EncoderConfig::for_stream(&stream, 2500, 128);
        let backend = MemoryEncoderFactory::new().create(&config).unwrap();
        let (mut recorder, _chunks) = Recorder::start(stream, backend, config).unwrap();
        recorder.stop().await.unwrap();
        assert!(recorder.stop().await.is_err());
        recorder.inactive().await;
    }

    struct Broken;

    impl EncoderBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn begin(&mut self, _config: &EncoderConfig, _sink: ChunkSink) -> TokslidesResult<()> {
            Ok(())
        }

        fn push_frame(&mut self, _rgba: &[u8]) -> TokslidesResult<()> {
            Err(TokslidesError::encode("pipe closed"))
        }

        fn end(&mut self) -> TokslidesResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_encoder_failure_makes_recorder_inactive() {
        let stream = stream(30);
        let config = EncoderConfig::for_stream(&stream, 2500, 128);
        let (mut recorder, _chunks) = Recorder::start(stream, Box::new(Broken), config).unwrap();
        recorder.inactive().await;
        assert_eq!(recorder.state(), RecorderState::Inactive);
        let err = recorder.stop().await.unwrap_err();
        assert!(matches!(err, TokslidesError::Encode { .. }));
    }
}
