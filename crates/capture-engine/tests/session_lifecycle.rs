use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokslides_capture_engine::testing::FakeDevices;
use tokslides_capture_engine::{
    FrameSlot, MemoryDownloads, MemoryEncoderFactory, MemoryProbe, NoticeLevel, OutputSurface,
    PlacementHandle, SessionConfig, SessionDeps, SessionEvent, SessionHandle, SessionPhase,
    SlideStage, StageConfig,
};
use tokslides_project_model::placement::CameraPlacement;
use tokslides_project_model::theme::find_theme;
use tokslides_render_engine::{
    blank_pixmap, Color, Pixmap, RasterizeError, RasterizeOptions, Rasterizer, SlideSurface,
    SurfaceRenderer,
};

const WIDTH: u32 = 108;
const HEIGHT: u32 = 192;

const DECK: &str = "# One\n---\n# Two\n---\n# Three\n---\n# Four\n---\n# Five";

/// Paints each slide a different grey and remembers which slides it saw.
#[derive(Default)]
struct IndexPainter {
    seen: Mutex<Vec<usize>>,
}

impl SurfaceRenderer for IndexPainter {
    fn render(
        &self,
        surface: &SlideSurface,
        width: u32,
        height: u32,
        _options: RasterizeOptions,
    ) -> Result<Pixmap, RasterizeError> {
        self.seen.lock().unwrap().push(surface.index);
        let mut pixmap = blank_pixmap(width, height);
        let shade = 40 * (surface.index as u8 + 1);
        pixmap.fill(Color::from_rgba8(shade, shade, shade, 255));
        Ok(pixmap)
    }
}

struct Rig {
    session: SessionHandle,
    events: UnboundedReceiver<SessionEvent>,
    devices: Arc<FakeDevices>,
    downloads: Arc<MemoryDownloads>,
    encoders: MemoryEncoderFactory,
    stage: SlideStage,
    painter: Arc<IndexPainter>,
}

fn rig(devices: Arc<FakeDevices>, surface: bool, encoders: MemoryEncoderFactory) -> Rig {
    tokslides_common::logging::init_test_logging();
    let painter = Arc::new(IndexPainter::default());
    let stage = SlideStage::new(
        Rasterizer::new(painter.clone()),
        find_theme("tiktok-dark"),
        StageConfig {
            width: WIDTH,
            height: HEIGHT,
            debounce: Duration::from_millis(250),
        },
    );
    stage.set_markdown(DECK);

    let downloads = Arc::new(MemoryDownloads::new());
    let mut session = SessionHandle::spawn(
        SessionConfig::default(),
        SessionDeps {
            devices: devices.clone(),
            stage: stage.clone(),
            camera: FrameSlot::new(),
            placement: PlacementHandle::new(CameraPlacement::default()),
            surface: surface.then(|| OutputSurface::new(WIDTH, HEIGHT)),
            encoders: Arc::new(encoders.clone()),
            downloads: downloads.clone(),
            segmenter: None,
        },
    );
    let events = session.take_events().unwrap();
    Rig {
        session,
        events,
        devices,
        downloads,
        encoders,
        stage,
        painter,
    }
}

async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
    panic!("event stream ended before the expected event: {seen:?}");
}

/// Let the recorder thread encode `more` frames. It runs on wall time, so
/// the paused test clock does not move it along.
async fn wait_for_encoded(probe: &MemoryProbe, more: u64) {
    let target = probe.frames() + more;
    for _ in 0..500 {
        if probe.frames() >= target {
            return;
        }
        tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(5)))
            .await
            .unwrap();
    }
    panic!("recorder encoded {} of {target} frames", probe.frames());
}

fn countdown_values(events: &[SessionEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Countdown(n) => Some(*n),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn denied_microphone_still_counts_down_and_records_video_only() {
    let mut rig = rig(
        FakeDevices::new().deny_microphone(),
        true,
        MemoryEncoderFactory::new(),
    );

    assert!(rig.session.record().await);
    assert_eq!(rig.session.phase(), SessionPhase::Countdown { remaining: 3 });

    let events = wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await;
    assert!(matches!(events[0], SessionEvent::PreviewMode(true)));
    match &events[1] {
        SessionEvent::Notice(notice) => assert_eq!(notice.level, NoticeLevel::Warning),
        other => panic!("expected a microphone warning, got {other:?}"),
    }
    assert_eq!(countdown_values(&events), vec![3, 2, 1]);
    assert!(matches!(events[events.len() - 2], SessionEvent::CountdownGo));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::RecordingStarted { has_audio: false })
    ));
    assert_eq!(rig.session.phase(), SessionPhase::Recording);
    assert_eq!(rig.devices.microphones_acquired(), 0);

    let mut phase = rig.session.watch_phase();
    let saved = rig.session.stop().await.expect("recording should be saved");
    assert!(!saved.has_audio);
    assert!(!rig.encoders.probe().had_audio());
    assert!(phase.has_changed().unwrap());
    assert_eq!(*phase.borrow_and_update(), SessionPhase::Idle);
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn five_slide_deck_records_to_one_file_in_order() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert_eq!(rig.stage.len(), 5);

    assert!(rig.session.record().await);
    wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { has_audio: true })
    })
    .await;
    assert_eq!(rig.devices.live_microphones(), 1);

    let probe = rig.encoders.probe();
    wait_for_encoded(&probe, 2).await;

    let snapshots = rig.stage.snapshots();
    for expected in 1..5 {
        assert_eq!(rig.stage.next(), expected);
        snapshots.changed().await;
        // A few ticks so the new slide is on the surface, then let it be encoded.
        tokio::time::sleep(Duration::from_millis(50)).await;
        wait_for_encoded(&probe, 2).await;
    }
    assert_eq!(rig.stage.next(), 4);

    let saved = rig.session.stop().await.expect("recording should be saved");
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
    assert!(saved.has_audio);
    assert!(saved.file_name.starts_with("tokslides-"));
    assert!(saved.file_name.ends_with(".webm"));
    assert_eq!(saved.mime, "video/webm;codecs=vp9,opus");
    assert_eq!(rig.devices.live_microphones(), 0);

    let files = rig.downloads.files();
    assert_eq!(files.len(), 1);
    let (name, data) = &files[0];
    assert_eq!(name, &saved.file_name);
    assert_eq!(data.len() as u64, saved.bytes);
    // Header chunk first, then one 32-byte digest per frame.
    assert!(data.starts_with(b"{\"format\":\"tokslides-digest\""));
    assert!(saved.frames >= 10);
    let digests = &data[data.len() - saved.frames as usize * 32..];
    let distinct: HashSet<&[u8]> = digests.chunks(32).collect();
    assert!(distinct.len() >= 5, "only {} distinct frames", distinct.len());
    assert_eq!(rig.encoders.probe().finished(), 1);

    let seen = rig.painter.seen.lock().unwrap().clone();
    for index in 0..5 {
        assert!(seen.contains(&index), "slide {index} never rasterized: {seen:?}");
    }

    let events = wait_for(&mut rig.events, |e| matches!(e, SessionEvent::Saved(_))).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::PreviewMode(false))));
}

#[tokio::test(start_paused = true)]
async fn first_recorded_frame_shows_the_slide() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);
    wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await;
    let probe = rig.encoders.probe();
    wait_for_encoded(&probe, 1).await;

    let frame = probe.first_frame().expect("a frame was encoded");
    assert_eq!(frame.len(), (WIDTH * HEIGHT * 4) as usize);
    let center = ((HEIGHT / 2 * WIDTH + WIDTH / 2) * 4) as usize;
    // Slide one is painted grey 40; a blank frame would be black.
    assert_eq!(&frame[center..center + 3], &[40, 40, 40]);
    assert!(rig.session.stop().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_while_idle_is_a_no_op() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.stop().await.is_none());
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
    assert!(rig.events.try_recv().is_err());
    assert!(rig.downloads.files().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_during_countdown_is_a_no_op() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);
    assert!(rig.session.stop().await.is_none());
    assert!(matches!(rig.session.phase(), SessionPhase::Countdown { .. }));

    wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await;
    assert!(rig.session.stop().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn second_record_while_active_is_rejected() {
    let rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);
    assert!(!rig.session.record().await);
    assert_eq!(rig.devices.microphones_acquired(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_surface_aborts_back_to_idle() {
    let mut rig = rig(FakeDevices::new(), false, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);

    let events = wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::PreviewMode(false))
    })
    .await;
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Notice(notice) if notice.level == NoticeLevel::Error
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Aborted { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::RecordingStarted { .. })));

    assert_eq!(rig.session.phase(), SessionPhase::Idle);
    assert_eq!(rig.devices.microphones_acquired(), 1);
    assert_eq!(rig.devices.live_microphones(), 0);
    assert_eq!(rig.encoders.probe().frames(), 0);
    assert!(rig.downloads.files().is_empty());

    // The user can try again.
    assert!(rig.session.record().await);
}

#[tokio::test(start_paused = true)]
async fn encoder_failure_aborts_and_releases_microphone() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::refusing());
    assert!(rig.session.record().await);
    wait_for(&mut rig.events, |e| matches!(e, SessionEvent::Aborted { .. })).await;
    assert_eq!(rig.session.phase(), SessionPhase::Idle);
    assert_eq!(rig.devices.live_microphones(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_countdown_releases_microphone() {
    let rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);
    assert_eq!(rig.devices.live_microphones(), 1);

    rig.session.shutdown().await;
    assert_eq!(rig.devices.live_microphones(), 0);
    assert!(rig.downloads.files().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_recording_saves_the_file() {
    let mut rig = rig(FakeDevices::new(), true, MemoryEncoderFactory::new());
    assert!(rig.session.record().await);
    wait_for(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await;

    rig.session.shutdown().await;
    assert_eq!(rig.downloads.files().len(), 1);
    assert_eq!(rig.devices.live_microphones(), 0);
}
