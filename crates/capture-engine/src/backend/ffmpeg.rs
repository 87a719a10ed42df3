//! VP9/Opus WebM encoding through an ffmpeg child process.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tokslides_common::{TokslidesError, TokslidesResult};
use tracing::{debug, info, warn};

use super::command_exists;
use crate::encoder::{ChunkSink, EncoderBackend, EncoderConfig, EncoderFactory};

/// Size of the reads from ffmpeg's stdout; each read becomes one chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// ffmpeg arguments that turn raw RGBA on stdin (plus an optional live
/// audio input) into WebM on stdout.
pub fn encoder_args(config: &EncoderConfig) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", config.width, config.height));
    args.extend(["-framerate".to_string(), config.fps.to_string()]);
    args.extend(["-i".to_string(), "pipe:0".to_string()]);

    if let Some(audio) = &config.audio {
        args.extend(
            ["-thread_queue_size", "1024", "-f", audio.format.as_str(), "-i", audio.device.as_str()]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(["-map", "0:v", "-map", "1:a"].iter().map(|s| s.to_string()));
    } else {
        args.push("-an".to_string());
    }

    args.extend(
        [
            "-c:v",
            "libvpx-vp9",
            "-deadline",
            "realtime",
            "-cpu-used",
            "8",
            "-row-mt",
            "1",
            "-pix_fmt",
            "yuv420p",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.extend(["-b:v".to_string(), format!("{}k", config.video_bitrate_kbps)]);

    if config.audio.is_some() {
        args.extend(["-c:a".to_string(), "libopus".to_string()]);
        args.extend(["-b:a".to_string(), format!("{}k", config.audio_bitrate_kbps)]);
        // The microphone never ends on its own.
        args.push("-shortest".to_string());
    }

    args.extend(["-f", "webm", "pipe:1"].iter().map(|s| s.to_string()));
    args
}

/// Streams frames into `ffmpeg` and forwards its WebM output as chunks.
#[derive(Default)]
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_reader: Option<JoinHandle<u64>>,
    stderr_drain: Option<JoinHandle<String>>,
    frame_len: usize,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_drain
            .take()
            .map(|drain| {
                drain
                    .join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default()
    }
}

impl EncoderBackend for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn begin(&mut self, config: &EncoderConfig, sink: ChunkSink) -> TokslidesResult<()> {
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(TokslidesError::encode(format!(
                "frame size {}x{} must be even for yuv420p",
                config.width, config.height
            )));
        }
        let args = encoder_args(config);
        debug!(?args, "Starting ffmpeg encoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TokslidesError::encode(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TokslidesError::encode("Failed to capture ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TokslidesError::encode("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TokslidesError::encode("Failed to capture ffmpeg stderr"))?;

        let stdout_reader = std::thread::spawn(move || {
            let mut total = 0u64;
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        total += n as u64;
                        if !sink.deliver(buf[..n].to_vec()) {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "Failed reading ffmpeg output");
                        break;
                    }
                }
            }
            total
        });
        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_drain = std::thread::spawn(move || {
            let mut output = String::new();
            match stderr.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        info!(pid = child.id(), audio = config.audio.is_some(), "ffmpeg encoder started");
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout_reader = Some(stdout_reader);
        self.stderr_drain = Some(stderr_drain);
        self.frame_len = config.frame_len();
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
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TokslidesError::invalid_state("ffmpeg encoder not started"))?;
        stdin
            .write_all(rgba)
            .map_err(|e| TokslidesError::encode(format!("ffmpeg stopped accepting frames: {e}")))
    }

    fn end(&mut self) -> TokslidesResult<()> {
        // Closing stdin is ffmpeg's end-of-stream.
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| TokslidesError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let bytes = self
            .stdout_reader
            .take()
            .map(|reader| reader.join().unwrap_or(0))
            .unwrap_or(0);
        let stderr = self.stderr_output();

        if !status.success() {
            return Err(TokslidesError::encode(format!(
                "ffmpeg encode failed (status {status}): {}",
                stderr.trim()
            )));
        }
        info!(bytes, "ffmpeg encoder finished");
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Creates [`FfmpegEncoder`]s after checking ffmpeg is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, _config: &EncoderConfig) -> TokslidesResult<Box<dyn EncoderBackend>> {
        if !command_exists("ffmpeg") {
            return Err(TokslidesError::unsupported(
                "ffmpeg is required for recording, but was not found on PATH",
            ));
        }
        Ok(Box::new(FfmpegEncoder::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::AudioSource;

    fn config(audio: Option<AudioSource>) -> EncoderConfig {
        EncoderConfig {
            width: 1080,
            height: 1920,
            fps: 30,
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 128,
            audio,
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_video_only_args() {
        let args = encoder_args(&config(None));
        assert!(has_pair(&args, "-s", "1080x1920"));
        assert!(has_pair(&args, "-framerate", "30"));
        assert!(has_pair(&args, "-c:v", "libvpx-vp9"));
        assert!(has_pair(&args, "-b:v", "2500k"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-shortest".to_string()));
        assert_eq!(&args[args.len() - 3..], &["-f", "webm", "pipe:1"]);
    }

    #[test]
    fn test_audio_args() {
        let args = encoder_args(&config(Some(AudioSource {
            format: "pulse".into(),
            device: "default".into(),
        })));
        assert!(has_pair(&args, "-f", "pulse"));
        assert!(has_pair(&args, "-i", "default"));
        assert!(has_pair(&args, "-map", "1:a"));
        assert!(has_pair(&args, "-c:a", "libopus"));
        assert!(has_pair(&args, "-b:a", "128k"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_odd_size_is_rejected_before_spawning() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut cfg = config(None);
        cfg.width = 1081;
        let err = FfmpegEncoder::new()
            .begin(&cfg, ChunkSink::new(tx))
            .unwrap_err();
        assert!(err.to_string().contains("must be even"));
    }
}
