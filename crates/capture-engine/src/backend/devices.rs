//! Cameras and microphones opened through ffmpeg input devices.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokslides_common::clock::RecordingClock;
use tokslides_common::config::RecordingDefaults;
use tokslides_common::{TokslidesError, TokslidesResult};
use tokslides_render_engine::CameraFrame;
use tracing::{debug, info, warn};

use super::{device_error, InputPlatform};
use crate::camera::FrameSlot;
use crate::devices::{AudioSource, AudioTrack, CameraSource, DeviceInfo, MediaDevices, Release};

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(8);
const MICROPHONE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform capture devices driven by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegDevices {
    platform: InputPlatform,
    camera_width: u32,
    camera_height: u32,
    camera_fps: u32,
    microphone: String,
}

impl FfmpegDevices {
    pub fn new(platform: InputPlatform, defaults: &RecordingDefaults) -> Self {
        Self {
            platform,
            camera_width: defaults.camera_width.max(2),
            camera_height: defaults.camera_height.max(2),
            camera_fps: defaults.fps.max(1),
            microphone: defaults.microphone_device.clone(),
        }
    }

    pub fn for_current_platform(defaults: &RecordingDefaults) -> TokslidesResult<Self> {
        let platform = InputPlatform::current().ok_or_else(|| {
            TokslidesError::unsupported("no ffmpeg capture devices for this platform")
        })?;
        Ok(Self::new(platform, defaults))
    }

    async fn microphone_source(&self) -> TokslidesResult<AudioSource> {
        let format = self.platform.audio_format().to_string();
        let device = match self.platform {
            InputPlatform::Linux => self.microphone.clone(),
            InputPlatform::MacOS if self.microphone == "default" => ":0".to_string(),
            InputPlatform::MacOS => format!(":{}", self.microphone),
            InputPlatform::Windows => {
                let name = if self.microphone == "default" {
                    let (_, audio) = self.list_devices().await?;
                    audio
                        .into_iter()
                        .next()
                        .map(|d| d.id)
                        .ok_or_else(|| TokslidesError::device("no microphone found"))?
                } else {
                    self.microphone.clone()
                };
                format!("audio={name}")
            }
        };
        Ok(AudioSource { format, device })
    }

    async fn default_camera(&self) -> TokslidesResult<String> {
        self.enumerate_cameras()
            .await?
            .into_iter()
            .next()
            .map(|d| d.id)
            .ok_or_else(|| TokslidesError::device("no camera found"))
    }

    /// `(cameras, microphones)` as reported by ffmpeg's device listing.
    async fn list_devices(&self) -> TokslidesResult<(Vec<DeviceInfo>, Vec<DeviceInfo>)> {
        let args: &[&str] = match self.platform {
            InputPlatform::Linux => return Ok((list_v4l2_cameras().await, Vec::new())),
            InputPlatform::MacOS => &["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""],
            InputPlatform::Windows => &["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"],
        };
        // The listing always "fails" because no input is opened.
        let output = tokio::process::Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TokslidesError::device(format!("Failed to start ffmpeg: {e}")))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(match self.platform {
            InputPlatform::MacOS => parse_avfoundation_devices(&stderr),
            _ => parse_dshow_devices(&stderr),
        })
    }
}

#[async_trait]
impl MediaDevices for FfmpegDevices {
    async fn acquire_microphone(&self) -> TokslidesResult<Box<dyn AudioTrack>> {
        let source = self.microphone_source().await?;
        debug!(format = %source.format, device = %source.device, "Probing microphone");

        let mut probe = tokio::process::Command::new("ffmpeg");
        probe
            .args(["-hide_banner", "-loglevel", "error", "-f"])
            .arg(&source.format)
            .arg("-i")
            .arg(&source.device)
            .args(["-t", "0.1", "-f", "null", "-"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = tokio::time::timeout(MICROPHONE_PROBE_TIMEOUT, probe.output())
            .await
            .map_err(|_| TokslidesError::device("microphone did not respond"))?
            .map_err(|e| TokslidesError::device(format!("Failed to start ffmpeg: {e}")))?;
        if !output.status.success() {
            return Err(device_error(
                "microphone",
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        info!(device = %source.device, "Microphone available");
        Ok(Box::new(FfmpegMicrophone {
            label: format!("{} {}", source.format, source.device),
            source,
            live: true,
        }))
    }

    async fn acquire_camera(
        &self,
        device: Option<&str>,
        slot: FrameSlot,
    ) -> TokslidesResult<Box<dyn CameraSource>> {
        let device = match device {
            Some(device) => device.to_string(),
            None => self.default_camera().await?,
        };
        let (width, height) = (self.camera_width, self.camera_height);
        let args = camera_args(self.platform, &device, width, height, self.camera_fps);
        debug!(?args, "Starting camera reader");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TokslidesError::device(format!("Failed to start ffmpeg: {e}")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TokslidesError::device("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TokslidesError::device("Failed to capture ffmpeg stderr"))?;

        let stderr_drain = std::thread::spawn(move || {
            let mut output = String::new();
            let _ = stderr.read_to_string(&mut output);
            output
        });

        let (first_tx, first_rx) = oneshot::channel();
        let reader_slot = slot.clone();
        let reader = std::thread::spawn(move || {
            let clock = RecordingClock::start();
            let mut first = Some(first_tx);
            let mut buf = vec![0u8; width as usize * height as usize * 4];
            while stdout.read_exact(&mut buf).is_ok() {
                match CameraFrame::from_rgba(width, height, buf.clone(), clock.elapsed_ms()) {
                    Ok(frame) => reader_slot.publish(frame),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed camera frame");
                        continue;
                    }
                }
                if let Some(tx) = first.take() {
                    let _ = tx.send(());
                }
            }
        });

        let mut camera = FfmpegCamera {
            label: device.clone(),
            device,
            child: Some(child),
            reader: Some(reader),
            stderr_drain: Some(stderr_drain),
        };

        match tokio::time::timeout(FIRST_FRAME_TIMEOUT, first_rx).await {
            Ok(Ok(())) => {
                info!(device = %camera.device, width, height, "Camera streaming");
                Ok(Box::new(camera))
            }
            Ok(Err(_)) => {
                let stderr = camera.shutdown();
                Err(device_error("camera", &stderr))
            }
            Err(_) => {
                camera.shutdown();
                Err(TokslidesError::device(format!(
                    "camera produced no frames within {}s",
                    FIRST_FRAME_TIMEOUT.as_secs()
                )))
            }
        }
    }

    async fn enumerate_cameras(&self) -> TokslidesResult<Vec<DeviceInfo>> {
        Ok(self.list_devices().await?.0)
    }
}

/// Arguments for an ffmpeg process that decodes `device` to raw RGBA frames
/// of exactly `width`×`height` on stdout, cropping to keep the aspect ratio.
pub fn camera_args(
    platform: InputPlatform,
    device: &str,
    width: u32,
    height: u32,
    fps: u32,
) -> Vec<String> {
    let input = match platform {
        InputPlatform::Windows => format!("video={device}"),
        _ => device.to_string(),
    };
    let filter = format!(
        "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height}"
    );
    let fps = fps.to_string();
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        platform.video_format(),
        "-framerate",
        fps.as_str(),
        "-i",
        input.as_str(),
        "-an",
        "-vf",
        filter.as_str(),
        "-pix_fmt",
        "rgba",
        "-f",
        "rawvideo",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

struct FfmpegCamera {
    label: String,
    device: String,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<String>>,
}

impl FfmpegCamera {
    /// Kill the decoder and wait for its threads. Returns ffmpeg's stderr.
    fn shutdown(&mut self) -> String {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.stderr_drain
            .take()
            .and_then(|drain| drain.join().ok())
            .unwrap_or_default()
    }
}

impl Release for FfmpegCamera {
    fn release(&mut self) {
        if self.child.is_some() {
            debug!(device = %self.device, "Releasing camera");
            self.shutdown();
        }
    }

    fn is_live(&self) -> bool {
        self.child.is_some()
    }
}

impl CameraSource for FfmpegCamera {
    fn label(&self) -> &str {
        &self.label
    }

    fn device_id(&self) -> &str {
        &self.device
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// A microphone that answered a probe. The encoder opens the device itself
/// through [`AudioSource`] once recording starts.
struct FfmpegMicrophone {
    label: String,
    source: AudioSource,
    live: bool,
}

impl Release for FfmpegMicrophone {
    fn release(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl AudioTrack for FfmpegMicrophone {
    fn label(&self) -> &str {
        &self.label
    }

    fn source(&self) -> AudioSource {
        self.source.clone()
    }
}

/// V4L2 capture nodes ordered from most to least webcam-like.
async fn list_v4l2_cameras() -> Vec<DeviceInfo> {
    tokio::task::spawn_blocking(|| {
        let mut candidates: Vec<(DeviceInfo, u32)> = Vec::new();
        for idx in 0..16u32 {
            let dev_path = format!("/dev/video{idx}");
            if !Path::new(&dev_path).exists() {
                continue;
            }
            let name = std::fs::read_to_string(format!("/sys/class/video4linux/video{idx}/name"))
                .map(|n| n.trim().to_string())
                .unwrap_or_default();
            let score = webcam_score(&name, probe_v4l2_capture_capability(&dev_path));
            if score == 0 {
                debug!(device = %dev_path, name = %name, "Skipping non-webcam V4L2 device");
                continue;
            }
            let label = if name.is_empty() { dev_path.clone() } else { name };
            candidates.push((
                DeviceInfo {
                    id: dev_path,
                    label,
                },
                score,
            ));
        }
        // Stable: equal scores keep /dev/videoN order.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.into_iter().map(|(info, _)| info).collect()
    })
    .await
    .unwrap_or_default()
}

/// Score a V4L2 device by name and capability (higher is more likely a
/// webcam). Zero rules the device out.
pub fn webcam_score(name: &str, supports_capture: Option<bool>) -> u32 {
    const WEBCAM: [&str; 9] = [
        "webcam", "camera", "cam", "facetime", "logitech", "microsoft", "razer", "elgato", "v4l2loopback",
    ];
    const NOT_WEBCAM: [&str; 9] = [
        "tuner", "tv", "dvb", "hdmi", "capture", "encoder", "decoder", "hauppauge", "blackmagic",
    ];

    let name = name.to_lowercase();
    if NOT_WEBCAM.iter().any(|kw| name.contains(kw)) {
        return 0;
    }
    let named = WEBCAM.iter().any(|kw| name.contains(kw));
    match (named, supports_capture) {
        (true, Some(true)) => 100,
        (true, _) => 80,
        (false, Some(true)) => 50,
        (false, Some(false)) => 0,
        (false, None) => 10,
    }
}

/// `Some(true)` if `v4l2-ctl` reports Video Capture, `None` without v4l2-ctl.
fn probe_v4l2_capture_capability(dev_path: &str) -> Option<bool> {
    let output = Command::new("v4l2-ctl")
        .args(["--device", dev_path, "--info"])
        .output()
        .ok()?;
    if !output.status.success() {
        return Some(false);
    }
    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    Some(stdout.contains("video capture"))
}

/// Strip the `[indev @ 0x...] ` prefix ffmpeg puts on device log lines.
fn log_content(line: &str) -> &str {
    if line.starts_with('[') {
        if let Some(end) = line.find("] ") {
            return line[end + 2..].trim();
        }
    }
    line.trim()
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Video,
    Audio,
}

/// Parse `-f avfoundation -list_devices true` output into
/// `(cameras, microphones)`. Ids are avfoundation device indices.
pub fn parse_avfoundation_devices(stderr: &str) -> (Vec<DeviceInfo>, Vec<DeviceInfo>) {
    let mut video = Vec::new();
    let mut audio = Vec::new();
    let mut section = Section::None;

    for line in stderr.lines() {
        let content = log_content(line);
        if content.contains("AVFoundation video devices") {
            section = Section::Video;
            continue;
        }
        if content.contains("AVFoundation audio devices") {
            section = Section::Audio;
            continue;
        }
        let Some(rest) = content.strip_prefix('[') else {
            continue;
        };
        let Some((index, label)) = rest.split_once(']') else {
            continue;
        };
        if index.parse::<u32>().is_err() {
            continue;
        }
        let info = DeviceInfo {
            id: index.to_string(),
            label: label.trim().to_string(),
        };
        match section {
            Section::Video if !info.label.starts_with("Capture screen") => video.push(info),
            Section::Audio => audio.push(info),
            _ => {}
        }
    }
    (video, audio)
}

/// Parse `-f dshow -list_devices true` output into `(cameras, microphones)`.
/// Handles both the sectioned and the `"Name" (video)` listing styles.
pub fn parse_dshow_devices(stderr: &str) -> (Vec<DeviceInfo>, Vec<DeviceInfo>) {
    let mut video = Vec::new();
    let mut audio = Vec::new();
    let mut section = Section::None;

    for line in stderr.lines() {
        let content = log_content(line);
        if content.contains("DirectShow video devices") {
            section = Section::Video;
            continue;
        }
        if content.contains("DirectShow audio devices") {
            section = Section::Audio;
            continue;
        }
        let Some(rest) = content.strip_prefix('"') else {
            continue;
        };
        let Some((name, tail)) = rest.split_once('"') else {
            continue;
        };
        let kind = if tail.contains("(video)") {
            Section::Video
        } else if tail.contains("(audio)") {
            Section::Audio
        } else if tail.trim().is_empty() {
            section
        } else {
            Section::None
        };
        let info = DeviceInfo {
            id: name.to_string(),
            label: name.to_string(),
        };
        match kind {
            Section::Video => video.push(info),
            Section::Audio => audio.push(info),
            Section::None => {}
        }
    }
    (video, audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webcam_score() {
        assert_eq!(webcam_score("Integrated Camera", Some(true)), 100);
        assert_eq!(webcam_score("HD Webcam C920", None), 80);
        assert_eq!(webcam_score("uvcvideo", Some(true)), 50);
        assert_eq!(webcam_score("uvcvideo", Some(false)), 0);
        assert_eq!(webcam_score("", None), 10);
        assert_eq!(webcam_score("Hauppauge WinTV", Some(true)), 0);
    }

    #[test]
    fn test_parse_avfoundation() {
        let stderr = "\
[AVFoundation indev @ 0x7f8b6c004a00] AVFoundation video devices:
[AVFoundation indev @ 0x7f8b6c004a00] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f8b6c004a00] [1] Capture screen 0
[AVFoundation indev @ 0x7f8b6c004a00] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8b6c004a00] [0] MacBook Pro Microphone
: Input/output error";
        let (video, audio) = parse_avfoundation_devices(stderr);
        assert_eq!(
            video,
            vec![DeviceInfo {
                id: "0".into(),
                label: "FaceTime HD Camera".into()
            }]
        );
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].label, "MacBook Pro Microphone");
    }

    #[test]
    fn test_parse_dshow_inline_style() {
        let stderr = r#"[dshow @ 000001c0] "Integrated Camera" (video)
[dshow @ 000001c0]   Alternative name "@device_pnp_\\?\usb#vid_04f2"
[dshow @ 000001c0] "Microphone Array (Realtek(R) Audio)" (audio)
[dshow @ 000001c0]   Alternative name "@device_cm_{33D9A762}\wave_{1}"
dummy: Immediate exit requested"#;
        let (video, audio) = parse_dshow_devices(stderr);
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].id, "Integrated Camera");
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].id, "Microphone Array (Realtek(R) Audio)");
    }

    #[test]
    fn test_parse_dshow_sectioned_style() {
        let stderr = r#"[dshow @ 0000] DirectShow video devices (some may be both video and audio devices)
[dshow @ 0000]  "USB Camera"
[dshow @ 0000]     Alternative name "@device_pnp_usb"
[dshow @ 0000] DirectShow audio devices
[dshow @ 0000]  "Headset Microphone"
"#;
        let (video, audio) = parse_dshow_devices(stderr);
        assert_eq!(video[0].label, "USB Camera");
        assert_eq!(audio[0].label, "Headset Microphone");
    }

    #[test]
    fn test_camera_args_crop_to_requested_size() {
        let args = camera_args(InputPlatform::Linux, "/dev/video0", 640, 480, 30);
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "v4l2"));
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/dev/video0"));
        assert!(args.contains(
            &"scale=640:480:force_original_aspect_ratio=increase,crop=640:480".to_string()
        ));
        let args = camera_args(InputPlatform::Windows, "USB Camera", 640, 480, 30);
        assert!(args.contains(&"video=USB Camera".to_string()));
    }
}
