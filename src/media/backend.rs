use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{MediaError, Result};

/// Input device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Camera
    Video,
    /// Microphone
    Audio,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Video => "video",
            DeviceKind::Audio => "audio",
        }
    }
}

/// A single input device as reported by the platform
///
/// Immutable snapshot: a fresh enumeration yields fresh descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform device identifier
    pub id: String,
    /// Device kind. `None` for outputs and anything else we never capture from
    pub kind: Option<DeviceKind>,
    /// Human readable label (may be empty before permission is granted)
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind),
            label: label.into(),
        }
    }
}

/// Device constraints for a combined audio+video stream request
///
/// `None` lets the platform pick its default device for that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    pub video_device_id: Option<String>,
    pub audio_device_id: Option<String>,
}

/// Event emitted by a running recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// An encoded fragment of the recording, in order
    Data(Vec<u8>),
    /// The recorder failed; no further data follows
    Error(MediaError),
}

/// Device enumeration and stream acquisition
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// List every device the platform knows about
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Acquire a live audio+video stream for the given devices
    ///
    /// May wait on a permission prompt.
    async fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>>;
}

/// A live audio+video stream holding the hardware tracks
pub trait MediaStream: Send + Sync {
    /// Stable identifier, used to bind the preview sink
    fn id(&self) -> &str;

    /// False once any track has ended or `stop_tracks` was called
    fn is_active(&self) -> bool;

    /// Id of the device backing the track of the given kind
    fn device_id(&self, kind: DeviceKind) -> Option<&str>;

    /// Stop every track, releasing the hardware. Must be idempotent.
    fn stop_tracks(&mut self);

    /// Create a recorder bound to this stream
    fn create_recorder(&self, mime_type: &str) -> Result<Box<dyn MediaRecorder>>;

    /// Create a frequency-domain analyser over this stream's audio track
    fn create_analyser(&self, fft_size: usize) -> Result<Box<dyn AudioAnalyser>>;
}

/// Chunked recorder over a live stream
pub trait MediaRecorder: Send {
    /// Start recording, emitting a data event roughly every `timeslice`
    ///
    /// The returned channel closes after `stop` once every buffered
    /// fragment has been delivered.
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<RecorderEvent>>;

    /// Stop recording and flush remaining data
    fn stop(&mut self) -> Result<()>;

    fn is_recording(&self) -> bool;
}

/// Frequency-domain sampling of an audio track
pub trait AudioAnalyser: Send {
    fn frequency_bin_count(&self) -> usize;

    /// Fill `out` with the current byte frequency magnitudes (0-255)
    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()>;

    /// Close the underlying audio context
    fn close(&mut self);
}

/// Live preview display, bound to at most one stream
pub trait PreviewSink: Send + Sync {
    fn bind_stream(&self, stream_id: Option<&str>);
}

/// Playback display, bound to at most one temporary reference
pub trait PlaybackSink: Send + Sync {
    fn bind_source(&self, url: Option<&str>);
}

/// Temporary references letting a sink read a binary object without copying it
pub trait ObjectUrls: Send + Sync {
    fn create_object_url(&self, mime_type: &str, data: Arc<[u8]>) -> String;

    fn revoke_object_url(&self, url: &str);
}

/// Every host capability the session depends on
#[derive(Clone)]
pub struct MediaPlatform {
    pub devices: Arc<dyn MediaDevices>,
    pub preview: Arc<dyn PreviewSink>,
    pub playback: Arc<dyn PlaybackSink>,
    pub urls: Arc<dyn ObjectUrls>,
}
