//! ffmpeg-backed devices and encoder.
//!
//! Capture hardware is opened through the platform's ffmpeg input device
//! (`v4l2`/`pulse` on Linux, `avfoundation` on macOS, `dshow` on Windows)
//! and recordings are encoded by an ffmpeg child fed raw frames on stdin.

use std::process::Command;

pub mod devices;
pub mod ffmpeg;

pub use devices::FfmpegDevices;
pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderFactory};

/// ffmpeg input formats for the current platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPlatform {
    Linux,
    MacOS,
    Windows,
}

impl InputPlatform {
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOS)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else {
            None
        }
    }

    pub fn video_format(&self) -> &'static str {
        match self {
            Self::Linux => "v4l2",
            Self::MacOS => "avfoundation",
            Self::Windows => "dshow",
        }
    }

    pub fn audio_format(&self) -> &'static str {
        match self {
            Self::Linux => "pulse",
            Self::MacOS => "avfoundation",
            Self::Windows => "dshow",
        }
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    let probe = if cfg!(target_os = "windows") {
        Command::new("where").arg(binary).output()
    } else {
        Command::new("sh")
            .arg("-c")
            .arg(format!("command -v {binary} >/dev/null 2>&1"))
            .output()
    };
    probe.map(|out| out.status.success()).unwrap_or(false)
}

/// Classify ffmpeg's complaint about a device it could not open.
pub(crate) fn device_error(what: &str, stderr: &str) -> tokslides_common::TokslidesError {
    use tokslides_common::TokslidesError;

    let lower = stderr.to_lowercase();
    let detail = stderr.trim().lines().last().unwrap_or("no output from ffmpeg");
    if lower.contains("permission denied")
        || lower.contains("operation not permitted")
        || lower.contains("not authorized")
    {
        TokslidesError::permission_denied(format!("{what}: {detail}"))
    } else {
        TokslidesError::device(format!("{what}: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_classification() {
        let err = device_error("camera", "[video4linux2] Cannot open video device /dev/video0: Permission denied\n");
        assert!(err.is_permission_denied());
        let err = device_error("microphone", "default: Connection refused");
        assert!(!err.is_permission_denied());
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_platform_formats() {
        assert_eq!(InputPlatform::Linux.video_format(), "v4l2");
        assert_eq!(InputPlatform::Linux.audio_format(), "pulse");
        assert_eq!(InputPlatform::Windows.audio_format(), "dshow");
    }
}
