//! TokSlides Capture Engine
//!
//! Runs a recording: owns the camera and microphone, keeps the current
//! slide snapshot fresh, composites output frames at display rate and
//! encodes them into a downloadable file.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SessionHandle                        │
//! │  ┌────────────┐  ┌──────────────┐  ┌───────────────────┐ │
//! │  │ SlideStage │  │ CameraManager│  │ PlacementModel    │ │
//! │  │ (snapshot) │  │ (FrameSlot)  │  │ (PlacementHandle) │ │
//! │  └─────┬──────┘  └──────┬───────┘  └─────────┬─────────┘ │
//! │        └───────────────┬┴────────────────────┘           │
//! │                        ▼                                 │
//! │              CompositionLoop ──► OutputSurface           │
//! │                                      │                   │
//! │              CaptureStream (+ mic) ◄─┘                   │
//! │                        │                                 │
//! │              Recorder ─► EncoderBackend ─► chunks        │
//! │                        │                                 │
//! │              ChunkBuffer ─► DownloadSink                 │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod camera;
pub mod devices;
pub mod download;
pub mod encoder;
pub mod notice;
pub mod placement;
pub mod scheduler;
pub mod segmentation;
pub mod session;
pub mod stage;
pub mod stream;
pub mod surface;
pub mod testing;

pub use camera::{CameraManager, FrameSlot};
pub use devices::{AudioSource, AudioTrack, CameraSource, DeviceInfo, Lease, MediaDevices, Release};
pub use download::{
    recording_file_name, DirectoryDownloads, DownloadSink, MemoryDownloads, SavedRecording,
    RECORDING_MIME,
};
pub use encoder::{
    ChunkBuffer, ChunkSink, EncoderBackend, EncoderConfig, EncoderFactory, MemoryEncoder,
    MemoryEncoderFactory, MemoryProbe, Recorder, RecorderState, RecordingStats,
};
pub use notice::{Notice, NoticeLevel};
pub use placement::{PlacementHandle, PlacementModel, WheelResponse};
pub use scheduler::{CompositionLoop, LoopInputs};
pub use segmentation::Segmenter;
pub use session::{SessionConfig, SessionDeps, SessionEvent, SessionHandle, SessionPhase};
pub use stage::{SlideStage, SnapshotCell, StageConfig};
pub use stream::CaptureStream;
pub use surface::OutputSurface;
