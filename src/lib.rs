pub mod config;
pub mod error;
pub mod media;
pub mod session;

pub use config::Config;
pub use error::{MediaError, Result};
pub use media::{
    DeviceDescriptor, DeviceKind, MediaPlatform, SimulatedDevices, SimulatedPlatform,
    StreamConstraints,
};
pub use session::{
    AccessOutcome, ArtifactInfo, RecordedArtifact, RecordingSession, RecordingState,
    SessionConfig, SessionSnapshot,
};
