use tracing::info;

use crate::media::MediaStream;

/// Result of a stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The stream was installed as the live capture session
    Granted { stream_id: String },
    /// A later request or a release overtook this one; its stream was stopped
    Superseded,
}

impl AccessOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessOutcome::Granted { .. })
    }
}

/// Exclusive owner of one live audio+video stream
///
/// Tracks are stopped when the session is closed or dropped, so a
/// `CaptureSession` going away always gives the hardware back.
pub struct CaptureSession {
    stream: Box<dyn MediaStream>,
}

impl CaptureSession {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        info!("Capture session opened: {}", stream.id());
        Self { stream }
    }

    pub fn id(&self) -> &str {
        self.stream.id()
    }

    pub fn stream(&self) -> &dyn MediaStream {
        self.stream.as_ref()
    }

    pub fn close(self) {
        info!("Capture session closed: {}", self.stream.id());
        // tracks are stopped in Drop
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stream.stop_tracks();
    }
}
