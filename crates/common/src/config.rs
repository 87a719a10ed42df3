//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `projects.json` and the image blob store.
    pub data_dir: PathBuf,

    /// Where finished recordings are saved.
    pub downloads_dir: PathBuf,

    /// Optional directory of custom font files referenced by themes.
    pub fonts_dir: Option<PathBuf>,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Capture rate of the output stream.
    pub fps: u32,

    /// Composition loop rate (display refresh).
    pub refresh_hz: u32,

    /// Countdown length in whole seconds.
    pub countdown_secs: u8,

    /// Quiet period before a slide change is rasterized.
    pub snapshot_debounce_ms: u64,

    pub video_bitrate_kbps: u32,

    pub audio_bitrate_kbps: u32,

    /// Requested camera frame size.
    pub camera_width: u32,
    pub camera_height: u32,

    /// Preferred camera device (e.g. `/dev/video0`). `None` picks the best match.
    pub camera_device: Option<String>,

    /// Microphone device passed to the platform audio input.
    pub microphone_device: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "tokslides=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            downloads_dir: default_downloads_dir(),
            fonts_dir: None,
            recording: RecordingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            refresh_hz: 60,
            countdown_secs: 3,
            snapshot_debounce_ms: 250,
            video_bitrate_kbps: 6000,
            audio_bitrate_kbps: 128,
            camera_width: 640,
            camera_height: 480,
            camera_device: None,
            microphone_device: "default".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Location of the JSON project collection.
    pub fn projects_file(&self) -> PathBuf {
        self.data_dir.join("projects.json")
    }

    /// Root of the content-addressed image store.
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("tokslides").join("config.json")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    base.join("tokslides")
}

fn default_downloads_dir() -> PathBuf {
    let videos = home_dir().join("Videos");
    if videos.is_dir() {
        videos
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_defaults() {
        let defaults = RecordingDefaults::default();
        assert_eq!(defaults.fps, 30);
        assert_eq!(defaults.countdown_secs, 3);
        assert_eq!(defaults.snapshot_debounce_ms, 250);
        assert_eq!((defaults.camera_width, defaults.camera_height), (640, 480));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"recording": {"fps": 24}, "logging": {"json": true}}"#)
                .unwrap();
        assert_eq!(config.recording.fps, 24);
        assert_eq!(config.recording.refresh_hz, 60);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_corrupt_file_falls_back() {
        let dir = std::env::temp_dir().join(format!("tokslides-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.recording.fps, 30);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_data_paths() {
        let config = AppConfig {
            data_dir: PathBuf::from("/data"),
            ..AppConfig::default()
        };
        assert_eq!(config.projects_file(), PathBuf::from("/data/projects.json"));
        assert_eq!(config.images_dir(), PathBuf::from("/data/images"));
    }
}
