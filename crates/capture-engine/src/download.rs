//! Handing a finished recording to the user as a file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tokslides_common::{TokslidesError, TokslidesResult};
use tracing::info;

/// Container and codecs of a finished recording.
pub const RECORDING_MIME: &str = "video/webm;codecs=vp9,opus";

/// `tokslides-<ms>.webm`, where `<ms>` is wall-clock milliseconds at save time.
pub fn recording_file_name(unix_ms: i64) -> String {
    format!("tokslides-{unix_ms}.webm")
}

/// What was saved and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedRecording {
    pub file_name: String,
    pub location: String,
    pub bytes: u64,
    pub mime: String,
    pub has_audio: bool,
    pub frames: u64,
    pub duration_ms: u64,
}

/// Destination for finished recordings.
pub trait DownloadSink: Send + Sync {
    /// Store `data` under `file_name` and return where it ended up.
    fn save(&self, file_name: &str, data: &[u8]) -> TokslidesResult<String>;
}

/// Saves into a directory, writing to a `.part` file first so a crash never
/// leaves a truncated recording under the final name.
#[derive(Debug, Clone)]
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectoryDownloads {
    fn save(&self, file_name: &str, data: &[u8]) -> TokslidesResult<String> {
        if file_name.contains(['/', '\\']) || file_name.is_empty() {
            return Err(TokslidesError::invalid_state(format!(
                "invalid download name {file_name:?}"
            )));
        }
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(file_name);
        let partial = self.dir.join(format!("{file_name}.part"));
        fs::write(&partial, data)?;
        fs::rename(&partial, &target)?;
        info!(path = %target.display(), bytes = data.len(), "Recording saved");
        Ok(target.display().to_string())
    }
}

/// Keeps saved files in memory.
#[derive(Debug, Default)]
pub struct MemoryDownloads {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DownloadSink for MemoryDownloads {
    fn save(&self, file_name: &str, data: &[u8]) -> TokslidesResult<String> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((file_name.to_string(), data.to_vec()));
        Ok(format!("memory://{file_name}"))
    }
}
