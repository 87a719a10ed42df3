//! Short user-facing messages raised by the capture pipeline.

use serde::Serialize;
use tokslides_common::TokslidesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational; the operation continued.
    Warning,
    /// Needs acknowledgement; the requested feature stays off.
    Blocking,
    /// The operation was aborted.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Blocking,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub(crate) fn microphone_unavailable(err: &TokslidesError) -> Self {
        if err.is_permission_denied() {
            Self::warning("Microphone access denied. Recording video only.")
        } else {
            Self::warning("Microphone unavailable. Recording video only.")
        }
    }

    pub(crate) fn camera_unavailable(err: &TokslidesError) -> Self {
        if err.is_permission_denied() {
            Self::blocking("Camera access denied. Allow camera access and try again.")
        } else {
            Self::blocking("Could not start the camera. Check that no other app is using it.")
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
