//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Device enumeration and camera/microphone selection
//! - Capture stream acquisition and release
//! - Microphone volume metering
//! - Countdown, recording and artifact finalization
//! - Playback of the finished recording

mod capture;
mod config;
mod devices;
mod playback;
mod recorder;
mod session;
mod state;
mod volume;

pub use capture::{AccessOutcome, CaptureSession};
pub use config::SessionConfig;
pub use devices::DeviceManager;
pub use playback::PlaybackPresenter;
pub use recorder::{ChunkCollector, RecordedArtifact};
pub use session::RecordingSession;
pub use state::{ArtifactInfo, RecordingState, SessionSnapshot};
pub use volume::{volume_level, VolumeMonitor};
