//! Error types shared across overlaycut crates.

use std::path::PathBuf;

/// Top-level error type for overlaycut operations.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Bad inputs detected before any engine work starts.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The transcoding engine or encoder sink failed.
    #[error("Engine error: {message}")]
    Engine { message: String },

    /// An asset (font, drawing image, source video) could not be loaded.
    #[error("Resource error: {message}")]
    Resource { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Export aborted")]
    Aborted,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using OverlayError.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Coarse classification used when reporting a failed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fix the inputs before retrying.
    Configuration,
    /// Retry the whole job after cleaning stale artifacts.
    Engine,
    /// A required asset is missing.
    Resource,
    /// The caller cancelled the job.
    Aborted,
}

impl OverlayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Unsupported { .. } => ErrorKind::Configuration,
            Self::Resource { .. } | Self::FileNotFound { .. } => ErrorKind::Resource,
            Self::Aborted => ErrorKind::Aborted,
            Self::Engine { .. } | Self::Render { .. } | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Engine
            }
        }
    }

    /// Whether re-running the same job unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        let err = OverlayError::config("trim start must precede end");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Configuration error: trim start must precede end"
        );
    }

    #[test]
    fn test_engine_errors_are_retryable() {
        let err = OverlayError::engine("ffmpeg exited with status 1");
        assert!(err.is_retryable());

        let io: OverlayError = std::io::Error::other("broken pipe").into();
        assert!(io.is_retryable());
    }

    #[test]
    fn test_missing_file_is_resource_error() {
        let err = OverlayError::FileNotFound {
            path: PathBuf::from("/nope.mp4"),
        };
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
