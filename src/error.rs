use thiserror::Error;

/// Errors surfaced by the host media platform and the recording session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user (or policy) refused camera/microphone access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The requested device does not exist or is held elsewhere
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    /// A capture track ended underneath an active recording
    #[error("Track ended: {0}")]
    TrackEnded(String),

    #[error("Audio analysis error: {0}")]
    Analyser(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MediaError {
    /// Whether the error came from acquiring a stream (user may retry)
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            MediaError::PermissionDenied(_) | MediaError::DeviceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
