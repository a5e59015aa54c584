//! Deterministic in-process media platform
//!
//! Stands in for the host's camera/microphone stack in tests and in the
//! demo binary. Every stream it hands out stays "held" until
//! `stop_tracks` is called, so leaked device holds are observable through
//! [`SimulatedDevices::held_streams`].

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{
    AudioAnalyser, DeviceDescriptor, DeviceKind, MediaDevices, MediaPlatform, MediaRecorder,
    MediaStream, PlaybackSink, PreviewSink, RecorderEvent, StreamConstraints,
};
use super::object_urls::LocalObjectUrls;
use crate::error::{MediaError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared per-stream state, visible to the stream, its recorder and analyser
struct StreamShared {
    id: String,
    video: DeviceDescriptor,
    audio: DeviceDescriptor,
    /// Cleared by `stop_tracks`
    held: AtomicBool,
    /// Set when the platform pulls the tracks (device unplugged)
    ended: AtomicBool,
}

impl StreamShared {
    fn is_active(&self) -> bool {
        self.held.load(Ordering::SeqCst) && !self.ended.load(Ordering::SeqCst)
    }
}

/// Simulated device enumeration and stream acquisition
pub struct SimulatedDevices {
    devices: Mutex<Vec<DeviceDescriptor>>,
    deny_permission: AtomicBool,
    fail_enumeration: AtomicBool,
    fail_recorder: Arc<AtomicBool>,
    acquire_delay: Mutex<Duration>,
    input_level: Arc<AtomicU8>,
    open_analysers: Arc<AtomicUsize>,
    streams: Mutex<Vec<Arc<StreamShared>>>,
    requests: Mutex<Vec<StreamConstraints>>,
}

impl SimulatedDevices {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Mutex::new(devices),
            deny_permission: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
            fail_recorder: Arc::new(AtomicBool::new(false)),
            acquire_delay: Mutex::new(Duration::ZERO),
            input_level: Arc::new(AtomicU8::new(0)),
            open_analysers: Arc::new(AtomicUsize::new(0)),
            streams: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the device list (simulates plugging/unplugging hardware)
    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *lock(&self.devices) = devices;
    }

    pub fn set_deny_permission(&self, deny: bool) {
        self.deny_permission.store(deny, Ordering::SeqCst);
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `create_recorder` calls fail
    pub fn set_fail_recorder(&self, fail: bool) {
        self.fail_recorder.store(fail, Ordering::SeqCst);
    }

    /// How long a permission prompt takes to resolve
    pub fn set_acquire_delay(&self, delay: Duration) {
        *lock(&self.acquire_delay) = delay;
    }

    /// Magnitude every frequency bin reports
    pub fn set_input_level(&self, level: u8) {
        self.input_level.store(level, Ordering::SeqCst);
    }

    /// End the tracks of every held stream, as if the devices vanished
    pub fn end_tracks(&self) {
        for stream in lock(&self.streams).iter() {
            stream.ended.store(true, Ordering::SeqCst);
        }
    }

    /// Streams acquired and not yet released with `stop_tracks`
    pub fn held_streams(&self) -> usize {
        lock(&self.streams)
            .iter()
            .filter(|s| s.held.load(Ordering::SeqCst))
            .count()
    }

    /// Ids of the devices backing each held stream, as `(video, audio)`
    pub fn held_devices(&self) -> Vec<(String, String)> {
        lock(&self.streams)
            .iter()
            .filter(|s| s.held.load(Ordering::SeqCst))
            .map(|s| (s.video.id.clone(), s.audio.id.clone()))
            .collect()
    }

    /// Analysers created and not yet closed
    pub fn open_analysers(&self) -> usize {
        self.open_analysers.load(Ordering::SeqCst)
    }

    /// Every `get_user_media` constraint seen so far
    pub fn requests(&self) -> Vec<StreamConstraints> {
        lock(&self.requests).clone()
    }

    fn pick(&self, kind: DeviceKind, wanted: Option<&str>) -> Result<DeviceDescriptor> {
        let devices = lock(&self.devices);
        let mut candidates = devices.iter().filter(|d| d.kind == Some(kind));

        let found = match wanted {
            Some(id) => candidates.find(|d| d.id == id),
            None => candidates.next(),
        };

        found.cloned().ok_or_else(|| {
            MediaError::DeviceUnavailable(match wanted {
                Some(id) => format!("no {} device with id {}", kind.as_str(), id),
                None => format!("no {} device present", kind.as_str()),
            })
        })
    }
}

#[async_trait::async_trait]
impl MediaDevices for SimulatedDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(MediaError::Enumeration("device list unavailable".to_string()));
        }
        Ok(lock(&self.devices).clone())
    }

    async fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>> {
        lock(&self.requests).push(constraints.clone());

        let delay = *lock(&self.acquire_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(
                "camera and microphone access denied".to_string(),
            ));
        }

        let video = self.pick(DeviceKind::Video, constraints.video_device_id.as_deref())?;
        let audio = self.pick(DeviceKind::Audio, constraints.audio_device_id.as_deref())?;

        let shared = Arc::new(StreamShared {
            id: format!("stream-{}", uuid::Uuid::new_v4()),
            video,
            audio,
            held: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        });

        info!(
            "Simulated stream {} opened ({} + {})",
            shared.id, shared.video.label, shared.audio.label
        );

        lock(&self.streams).push(Arc::clone(&shared));

        Ok(Box::new(SimulatedStream {
            shared,
            input_level: Arc::clone(&self.input_level),
            open_analysers: Arc::clone(&self.open_analysers),
            fail_recorder: Arc::clone(&self.fail_recorder),
        }))
    }
}

struct SimulatedStream {
    shared: Arc<StreamShared>,
    input_level: Arc<AtomicU8>,
    open_analysers: Arc<AtomicUsize>,
    fail_recorder: Arc<AtomicBool>,
}

impl MediaStream for SimulatedStream {
    fn id(&self) -> &str {
        &self.shared.id
    }

    fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    fn device_id(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::Video => Some(self.shared.video.id.as_str()),
            DeviceKind::Audio => Some(self.shared.audio.id.as_str()),
        }
    }

    fn stop_tracks(&mut self) {
        if self.shared.held.swap(false, Ordering::SeqCst) {
            debug!("Simulated stream {} tracks stopped", self.shared.id);
        }
    }

    fn create_recorder(&self, mime_type: &str) -> Result<Box<dyn MediaRecorder>> {
        if self.fail_recorder.load(Ordering::SeqCst) {
            return Err(MediaError::Recorder(format!(
                "unsupported mime type {}",
                mime_type
            )));
        }
        if !self.shared.is_active() {
            return Err(MediaError::TrackEnded(self.shared.id.clone()));
        }

        Ok(Box::new(SimulatedRecorder {
            shared: Arc::clone(&self.shared),
            stop_tx: None,
            task: None,
        }))
    }

    fn create_analyser(&self, fft_size: usize) -> Result<Box<dyn AudioAnalyser>> {
        if !self.shared.is_active() {
            return Err(MediaError::TrackEnded(self.shared.id.clone()));
        }

        self.open_analysers.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimulatedAnalyser {
            shared: Arc::clone(&self.shared),
            level: Arc::clone(&self.input_level),
            open: Arc::clone(&self.open_analysers),
            bins: fft_size / 2,
            closed: false,
        }))
    }
}

/// Emits one small fragment per timeslice, plus a final one on stop
struct SimulatedRecorder {
    shared: Arc<StreamShared>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

fn fragment(sequence: usize) -> Vec<u8> {
    format!("chunk-{:03};", sequence).into_bytes()
}

impl MediaRecorder for SimulatedRecorder {
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<RecorderEvent>> {
        if self.stop_tx.is_some() {
            return Err(MediaError::Recorder("recorder already started".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);

        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            let mut sequence = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        // Flush what was buffered since the last slice
                        let _ = tx.send(RecorderEvent::Data(fragment(sequence))).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        if shared.ended.load(Ordering::SeqCst) {
                            let _ = tx
                                .send(RecorderEvent::Error(MediaError::TrackEnded(shared.id.clone())))
                                .await;
                            break;
                        }
                        if tx.send(RecorderEvent::Data(fragment(sequence))).await.is_err() {
                            break;
                        }
                        sequence += 1;
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                // The task may already have exited on a track error
                let _ = stop_tx.send(());
                self.task = None;
                Ok(())
            }
            None => Err(MediaError::Recorder("recorder not started".to_string())),
        }
    }

    fn is_recording(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Drop for SimulatedRecorder {
    fn drop(&mut self) {
        // Dropped without stop: nobody will drain the channel
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct SimulatedAnalyser {
    shared: Arc<StreamShared>,
    level: Arc<AtomicU8>,
    open: Arc<AtomicUsize>,
    bins: usize,
    closed: bool,
}

impl AudioAnalyser for SimulatedAnalyser {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        if self.closed {
            return Err(MediaError::Analyser("audio context closed".to_string()));
        }
        if self.shared.ended.load(Ordering::SeqCst) {
            return Err(MediaError::TrackEnded(self.shared.id.clone()));
        }

        out.fill(self.level.load(Ordering::SeqCst));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Display sink that remembers what it is showing
#[derive(Default)]
pub struct SimulatedSink {
    bound: Mutex<Option<String>>,
}

impl SimulatedSink {
    pub fn bound(&self) -> Option<String> {
        lock(&self.bound).clone()
    }
}

impl PreviewSink for SimulatedSink {
    fn bind_stream(&self, stream_id: Option<&str>) {
        *lock(&self.bound) = stream_id.map(str::to_string);
    }
}

impl PlaybackSink for SimulatedSink {
    fn bind_source(&self, url: Option<&str>) {
        *lock(&self.bound) = url.map(str::to_string);
    }
}

/// A complete simulated platform with handles kept for inspection
#[derive(Clone)]
pub struct SimulatedPlatform {
    pub devices: Arc<SimulatedDevices>,
    pub preview: Arc<SimulatedSink>,
    pub playback: Arc<SimulatedSink>,
    pub urls: Arc<LocalObjectUrls>,
}

impl SimulatedPlatform {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Arc::new(SimulatedDevices::new(devices)),
            preview: Arc::new(SimulatedSink::default()),
            playback: Arc::new(SimulatedSink::default()),
            urls: Arc::new(LocalObjectUrls::new()),
        }
    }

    /// Two cameras and two microphones
    pub fn with_default_devices() -> Self {
        Self::new(vec![
            DeviceDescriptor::new("cam-1", DeviceKind::Video, "Integrated Camera"),
            DeviceDescriptor::new("cam-2", DeviceKind::Video, "USB Camera"),
            DeviceDescriptor::new("mic-1", DeviceKind::Audio, "Built-in Microphone"),
            DeviceDescriptor::new("mic-2", DeviceKind::Audio, "USB Microphone"),
        ])
    }

    pub fn platform(&self) -> MediaPlatform {
        MediaPlatform {
            devices: self.devices.clone(),
            preview: self.preview.clone(),
            playback: self.playback.clone(),
            urls: self.urls.clone(),
        }
    }
}
