//! Present a deck and record it.
//!
//! The deck is driven from stdin while the session runs; see [`StdinCommand`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc::UnboundedReceiver;
use tokslides_capture_engine::backend::{FfmpegDevices, FfmpegEncoderFactory};
use tokslides_capture_engine::{
    CameraManager, DirectoryDownloads, FrameSlot, MediaDevices, OutputSurface, PlacementHandle,
    PlacementModel, SavedRecording, SessionConfig, SessionDeps, SessionEvent, SessionHandle,
    SlideStage, StageConfig,
};
use tokslides_common::config::AppConfig;
use tokslides_project_model::{find_theme, CameraPlacement, CameraShape};
use tokslides_render_engine::Rasterizer;

use super::deck;
use crate::DeckSource;

pub struct RecordOptions {
    pub deck: DeckSource,
    pub camera: Option<String>,
    pub no_camera: bool,
    pub shape: String,
    pub output: Option<PathBuf>,
}

/// A line typed while presenting.
#[derive(Debug, Clone, PartialEq)]
pub enum StdinCommand {
    Next,
    Prev,
    /// Zero-based slide index.
    GoTo(usize),
    Shape(CameraShape),
    /// Theme id; unknown ids fall back to the default theme.
    Theme(String),
    /// Drag the camera by a pointer delta in preview pixels.
    Drag(f64, f64),
    /// Wheel delta; positive shrinks the camera.
    Zoom(f64),
    Footer,
    Camera,
    Stop,
}

impl StdinCommand {
    pub const HELP: &'static str =
        "commands: next | prev | goto N | shape S | theme ID | drag DX DY | zoom DELTA | footer | camera | stop";

    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let number = |i: usize| -> Result<f64, String> {
            let raw = args.get(i).ok_or_else(|| format!("'{verb}' needs more arguments"))?;
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{raw}' is not a number"))
        };

        let command = match verb {
            "next" | "n" => Self::Next,
            "prev" | "p" => Self::Prev,
            "goto" | "g" => {
                let raw = args.first().ok_or("'goto' needs a slide number")?;
                let n: usize = raw
                    .parse()
                    .map_err(|_| format!("'{raw}' is not a slide number"))?;
                Self::GoTo(n.saturating_sub(1))
            }
            "shape" => {
                let raw = args.first().ok_or("'shape' needs a shape name")?;
                Self::Shape(raw.parse().map_err(|e| format!("{e}"))?)
            }
            "theme" => {
                let raw = args.first().ok_or("'theme' needs a theme id")?;
                Self::Theme(raw.to_string())
            }
            "drag" => Self::Drag(number(0)?, number(1)?),
            "zoom" => Self::Zoom(number(0)?),
            "footer" => Self::Footer,
            "camera" => Self::Camera,
            "stop" | "q" => Self::Stop,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(Some(command))
    }
}

pub async fn run(config: &AppConfig, options: RecordOptions) -> anyhow::Result<()> {
    let shape: CameraShape = options.shape.parse()?;
    let deck = deck::load(config, &options.deck)?;

    let stage = SlideStage::new(
        Rasterizer::new(deck::renderer(config, &deck)),
        deck.theme.clone(),
        StageConfig {
            debounce: Duration::from_millis(config.recording.snapshot_debounce_ms),
            ..StageConfig::default()
        },
    );
    stage.set_markdown(&deck.markdown);
    stage.set_show_footer(!options.deck.no_footer);

    let devices: Arc<dyn MediaDevices> = Arc::new(
        FfmpegDevices::for_current_platform(&config.recording)
            .context("camera and microphone input is not available on this platform")?,
    );
    let slot = FrameSlot::new();
    let mut camera = CameraManager::new(devices.clone(), slot.clone())
        .with_device(options.camera.or_else(|| config.recording.camera_device.clone()));
    if !options.no_camera {
        if let Err(notice) = camera.enable().await {
            eprintln!("{notice}");
        }
    }

    let placement =
        PlacementModel::new(PlacementHandle::new(CameraPlacement::default().with_shape(shape)));

    let output = options
        .output
        .unwrap_or_else(|| config.downloads_dir.clone());
    let mut session = SessionHandle::spawn(
        SessionConfig::from(&config.recording),
        SessionDeps {
            devices,
            stage: stage.clone(),
            camera: slot,
            placement: placement.handle(),
            surface: Some(OutputSurface::canvas()),
            encoders: Arc::new(FfmpegEncoderFactory),
            downloads: Arc::new(DirectoryDownloads::new(&output)),
            segmenter: None,
        },
    );
    let mut events = session
        .take_events()
        .context("session events already taken")?;

    println!("Presenting '{}' ({} slides, {})", deck.name, stage.len(), deck.theme.name);
    println!("  Output: {}", output.display());
    println!("  {}", StdinCommand::HELP);
    println!();

    if !session.record().await {
        anyhow::bail!("recording could not be started");
    }

    let mut controls = Controls {
        stage,
        placement,
        camera,
    };
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let (outcome, mut saved) = present(
        &session,
        &mut events,
        lines,
        tokio::signal::ctrl_c(),
        &mut controls,
    )
    .await;

    // A recording still running is finalized and saved here.
    session.shutdown().await;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Saved(recording) => {
                if saved.is_none() {
                    print_saved(&recording);
                    saved = Some(recording);
                }
            }
            other => print_event(&other),
        }
    }
    controls.camera.disable();
    outcome
}

/// What stdin commands act on while presenting.
struct Controls {
    stage: SlideStage,
    placement: PlacementModel,
    camera: CameraManager,
}

/// Drive a started session from input lines until `stop`, end of input, an
/// abort or `interrupt`. Returns the outcome and the recording saved so far.
async fn present<R>(
    session: &SessionHandle,
    events: &mut UnboundedReceiver<SessionEvent>,
    mut lines: Lines<R>,
    interrupt: impl Future<Output = std::io::Result<()>>,
    controls: &mut Controls,
) -> (anyhow::Result<()>, Option<SavedRecording>)
where
    R: AsyncBufRead + Unpin,
{
    tokio::pin!(interrupt);
    let mut saved: Option<SavedRecording> = None;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break Ok(()) };
                match event {
                    SessionEvent::Aborted { reason } => {
                        break Err(anyhow::anyhow!("recording aborted: {reason}"));
                    }
                    SessionEvent::Saved(recording) => {
                        print_saved(&recording);
                        saved = Some(recording);
                    }
                    other => print_event(&other),
                }
            }
            line = lines.next_line() => {
                let line = match line.context("failed to read stdin") {
                    Ok(line) => line,
                    Err(e) => break Err(e),
                };
                let Some(line) = line else {
                    // stdin closed: finish like Ctrl-C.
                    break Ok(());
                };
                match StdinCommand::parse(&line) {
                    Ok(Some(StdinCommand::Stop)) => {
                        if let Some(recording) = session.stop().await {
                            if saved.is_none() {
                                print_saved(&recording);
                            }
                            saved = Some(recording);
                            break Ok(());
                        }
                        println!("Not recording yet.");
                    }
                    Ok(Some(command)) => controls.apply(command).await,
                    Ok(None) => {}
                    Err(message) => println!("{message}. {}", StdinCommand::HELP),
                }
            }
            _ = &mut interrupt => {
                println!();
                break Ok(());
            }
        }
    };
    (outcome, saved)
}

impl Controls {
    async fn apply(&mut self, command: StdinCommand) {
        let stage = &self.stage;
        match command {
            StdinCommand::Next => println!("Slide {}/{}", stage.next() + 1, stage.len()),
            StdinCommand::Prev => println!("Slide {}/{}", stage.prev() + 1, stage.len()),
            StdinCommand::GoTo(index) => {
                println!("Slide {}/{}", stage.go_to(index) + 1, stage.len())
            }
            StdinCommand::Shape(shape) => {
                self.placement.set_shape(shape);
                println!("Camera shape: {}", shape.as_str());
            }
            StdinCommand::Theme(id) => {
                let theme = find_theme(&id);
                println!("Theme: {}", theme.name);
                stage.set_theme(theme);
            }
            StdinCommand::Drag(dx, dy) => {
                self.placement.pointer_down(0.0, 0.0);
                if let Some(moved) = self.placement.pointer_move(dx, dy) {
                    println!(
                        "Camera at {:.1}%, {:.1}%",
                        moved.position().x(),
                        moved.position().y()
                    );
                }
                self.placement.pointer_up();
            }
            StdinCommand::Zoom(delta) => {
                let _ = self.placement.wheel(delta);
                println!("Camera scale: {:.2}", self.placement.placement().scale());
            }
            StdinCommand::Footer => {
                let shown = stage.toggle_footer();
                println!("Footer {}", if shown { "shown" } else { "hidden" });
            }
            StdinCommand::Camera => match self.camera.toggle().await {
                Ok(true) => println!("Camera on"),
                Ok(false) => println!("Camera off"),
                Err(notice) => eprintln!("{notice}"),
            },
            StdinCommand::Stop => {}
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::PreviewMode(on) => tracing::debug!(preview = on, "Preview mode"),
        SessionEvent::Notice(notice) => eprintln!("{notice}"),
        SessionEvent::Countdown(n) => println!("{n}..."),
        SessionEvent::CountdownGo => println!("Go!"),
        SessionEvent::RecordingStarted { has_audio } => {
            let audio = if *has_audio { "with microphone" } else { "video only" };
            println!("Recording ({audio}). Type 'stop' to finish.");
        }
        SessionEvent::Saved(recording) => print_saved(recording),
        SessionEvent::Aborted { reason } => eprintln!("Recording aborted: {reason}"),
    }
}

fn print_saved(recording: &SavedRecording) {
    println!(
        "Saved {} ({} frames, {:.1}s, {} KiB) to {}",
        recording.file_name,
        recording.frames,
        recording.duration_ms as f64 / 1000.0,
        recording.bytes / 1024,
        recording.location
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokslides_capture_engine::testing::FakeDevices;
    use tokslides_capture_engine::{MemoryDownloads, MemoryEncoderFactory, SessionPhase};
    use tokslides_render_engine::{
        blank_pixmap, Pixmap, RasterizeError, RasterizeOptions, SlideSurface, SurfaceRenderer,
    };

    struct Flat;

    impl SurfaceRenderer for Flat {
        fn render(
            &self,
            _surface: &SlideSurface,
            width: u32,
            height: u32,
            _options: RasterizeOptions,
        ) -> Result<Pixmap, RasterizeError> {
            Ok(blank_pixmap(width, height))
        }
    }

    fn presenting() -> (SessionHandle, UnboundedReceiver<SessionEvent>, Controls) {
        let devices = FakeDevices::new();
        let stage = SlideStage::new(
            Rasterizer::new(Arc::new(Flat)),
            find_theme("tiktok-dark"),
            StageConfig {
                width: 36,
                height: 64,
                debounce: Duration::from_millis(250),
            },
        );
        stage.set_markdown("# One\n---\n# Two");
        let placement = PlacementModel::new(PlacementHandle::default());
        let mut session = SessionHandle::spawn(
            SessionConfig::default(),
            SessionDeps {
                devices: devices.clone(),
                stage: stage.clone(),
                camera: FrameSlot::new(),
                placement: placement.handle(),
                surface: Some(OutputSurface::new(36, 64)),
                encoders: Arc::new(MemoryEncoderFactory::new()),
                downloads: Arc::new(MemoryDownloads::new()),
                segmenter: None,
            },
        );
        let events = session.take_events().unwrap();
        let controls = Controls {
            stage,
            placement,
            camera: CameraManager::new(devices, FrameSlot::new()),
        };
        (session, events, controls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_is_not_reset_by_countdown_events() {
        let (session, mut events, mut controls) = presenting();
        assert!(session.record().await);

        // Input stays open and silent.
        let (_writer, reader) = tokio::io::duplex(64);
        let interrupt = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok(())
        };
        let (outcome, saved) = present(
            &session,
            &mut events,
            BufReader::new(reader).lines(),
            interrupt,
            &mut controls,
        )
        .await;

        assert!(outcome.is_ok());
        assert!(saved.is_none());
        // Countdown events at 1s did not restart the 1.5s interrupt.
        assert_eq!(session.phase(), SessionPhase::Countdown { remaining: 2 });
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stdin_commands_drive_the_session() {
        let (session, mut events, mut controls) = presenting();
        assert!(session.record().await);

        let (mut writer, reader) = tokio::io::duplex(64);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            writer.write_all(b"next\nshape square\nstop\n").await.unwrap();
            // Held open so only `stop` can end the loop.
            std::future::pending::<()>().await;
        });
        let (outcome, saved) = present(
            &session,
            &mut events,
            BufReader::new(reader).lines(),
            std::future::pending::<std::io::Result<()>>(),
            &mut controls,
        )
        .await;

        assert!(outcome.is_ok());
        assert!(saved.is_some());
        assert_eq!(controls.stage.index(), 1);
        assert_eq!(controls.placement.placement().shape(), CameraShape::Square);
        assert_eq!(session.phase(), SessionPhase::Idle);
        session.shutdown().await;
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(StdinCommand::parse("next"), Ok(Some(StdinCommand::Next)));
        assert_eq!(StdinCommand::parse("  p "), Ok(Some(StdinCommand::Prev)));
        assert_eq!(StdinCommand::parse("goto 3"), Ok(Some(StdinCommand::GoTo(2))));
        assert_eq!(StdinCommand::parse("goto 0"), Ok(Some(StdinCommand::GoTo(0))));
        assert_eq!(
            StdinCommand::parse("shape portrait"),
            Ok(Some(StdinCommand::Shape(CameraShape::Portrait)))
        );
        assert_eq!(
            StdinCommand::parse("drag -12.5 40"),
            Ok(Some(StdinCommand::Drag(-12.5, 40.0)))
        );
        assert_eq!(
            StdinCommand::parse("theme neon-vibes"),
            Ok(Some(StdinCommand::Theme("neon-vibes".to_string())))
        );
        assert_eq!(StdinCommand::parse("zoom 100"), Ok(Some(StdinCommand::Zoom(100.0))));
        assert_eq!(StdinCommand::parse("stop"), Ok(Some(StdinCommand::Stop)));
        assert_eq!(StdinCommand::parse(""), Ok(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(StdinCommand::parse("jump").is_err());
        assert!(StdinCommand::parse("goto").is_err());
        assert!(StdinCommand::parse("goto two").is_err());
        assert!(StdinCommand::parse("shape hexagon").is_err());
        assert!(StdinCommand::parse("drag 5").is_err());
        assert!(StdinCommand::parse("theme").is_err());
        assert!(StdinCommand::parse("zoom NaN").is_err());
    }
}
