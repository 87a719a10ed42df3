//! Error types shared across TokSlides crates.

/// Top-level error type for TokSlides operations.
#[derive(Debug, thiserror::Error)]
pub enum TokslidesError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using TokslidesError.
pub type TokslidesResult<T> = Result<T, TokslidesError>;

impl TokslidesError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the failure came from the user or OS refusing access to a device.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = TokslidesError::encode("ffmpeg exited with status 1");
        assert_eq!(err.to_string(), "Encode error: ffmpeg exited with status 1");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TokslidesError = io.into();
        assert!(matches!(err, TokslidesError::Io(_)));
    }

    #[test]
    fn test_permission_denied_predicate() {
        assert!(TokslidesError::permission_denied("mic").is_permission_denied());
        assert!(!TokslidesError::device("mic").is_permission_denied());
    }
}
