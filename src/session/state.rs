use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::DeviceDescriptor;

/// Phase of the recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "value", rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    /// Seconds left before recording begins
    CountingDown(u32),
    /// Seconds recorded so far
    Recording(u64),
    Stopped,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountingDown(_) => "counting_down",
            Self::Recording(_) => "recording",
            Self::Stopped => "stopped",
        }
    }

    /// Whether `start` may leave this state
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }

    /// Countdown or recording in progress
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::CountingDown(_) | Self::Recording(_))
    }

    pub fn countdown(&self) -> Option<u32> {
        match self {
            Self::CountingDown(n) => Some(*n),
            _ => None,
        }
    }

    /// Elapsed-time display; zero outside of recording
    pub fn elapsed_secs(&self) -> u64 {
        match self {
            Self::Recording(secs) => *secs,
            _ => 0,
        }
    }
}

/// Metadata of the finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: uuid::Uuid,
    pub mime_type: String,
    pub size_bytes: usize,
    pub fragment_count: usize,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of a session, for rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: RecordingState,

    /// Countdown display, present only while counting down
    pub countdown: Option<u32>,

    pub elapsed_secs: u64,

    /// Latest volume meter reading (0-100)
    pub volume: u8,

    /// Id of the live stream, if a capture session is open
    pub stream_id: Option<String>,

    pub video_devices: Vec<DeviceDescriptor>,
    pub audio_devices: Vec<DeviceDescriptor>,
    pub selected_video: Option<String>,
    pub selected_audio: Option<String>,

    /// Selector texts (device label or placeholder)
    pub video_selector: String,
    pub audio_selector: String,

    pub artifact: Option<ArtifactInfo>,

    /// Temporary reference the playback sink is bound to
    pub playback_url: Option<String>,

    pub submitted: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn has_session(&self) -> bool {
        self.stream_id.is_some()
    }

    /// Whether the record control is reachable
    pub fn can_start(&self) -> bool {
        self.has_session() && self.state.can_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_state_as_str() {
        assert_eq!(RecordingState::Idle.as_str(), "idle");
        assert_eq!(RecordingState::CountingDown(2).as_str(), "counting_down");
        assert_eq!(RecordingState::Recording(4).as_str(), "recording");
        assert_eq!(RecordingState::Stopped.as_str(), "stopped");
    }

    #[test]
    fn test_elapsed_only_while_recording() {
        assert_eq!(RecordingState::Recording(7).elapsed_secs(), 7);
        assert_eq!(RecordingState::CountingDown(3).elapsed_secs(), 0);
        assert_eq!(RecordingState::Stopped.elapsed_secs(), 0);
    }

    #[test]
    fn test_recording_state_serialization() {
        let json = serde_json::to_string(&RecordingState::CountingDown(2)).unwrap();
        assert_eq!(json, r#"{"phase":"counting_down","value":2}"#);

        let json = serde_json::to_string(&RecordingState::Stopped).unwrap();
        assert_eq!(json, r#"{"phase":"stopped"}"#);

        let parsed: RecordingState =
            serde_json::from_str(r#"{"phase":"recording","value":5}"#).unwrap();
        assert_eq!(parsed, RecordingState::Recording(5));
    }
}
