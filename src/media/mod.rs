pub mod backend;
pub mod object_urls;
pub mod simulated;

pub use backend::{
    AudioAnalyser, DeviceDescriptor, DeviceKind, MediaDevices, MediaPlatform, MediaRecorder,
    MediaStream, ObjectUrls, PlaybackSink, PreviewSink, RecorderEvent, StreamConstraints,
};
pub use object_urls::LocalObjectUrls;
pub use simulated::{SimulatedDevices, SimulatedPlatform, SimulatedSink};
