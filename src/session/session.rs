use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use super::capture::{AccessOutcome, CaptureSession};
use super::config::SessionConfig;
use super::devices::DeviceManager;
use super::playback::PlaybackPresenter;
use super::recorder::{ChunkCollector, RecordedArtifact};
use super::state::{RecordingState, SessionSnapshot};
use super::volume::VolumeMonitor;
use crate::error::{MediaError, Result};
use crate::media::{
    DeviceKind, MediaDevices, MediaPlatform, MediaRecorder, PreviewSink, RecorderEvent,
    StreamConstraints,
};

/// A webcam/microphone recording session
///
/// Owns the capture stream, volume meter, countdown/elapsed timers, the
/// recorder and the finished artifact. Every periodic task is tied to the
/// session: releasing the capture session cancels all of them.
pub struct RecordingSession {
    session_id: String,
    devices: Arc<dyn MediaDevices>,
    inner: Arc<Mutex<Inner>>,
    volume_rx: watch::Receiver<u8>,
    flushing_rx: watch::Receiver<usize>,
}

/// The take currently being recorded
struct ActiveTake {
    id: u64,
    recorder: Box<dyn MediaRecorder>,
    /// Hands the final length to the collector once the take is stopped
    duration_tx: oneshot::Sender<u64>,
    collector: JoinHandle<()>,
}

struct Inner {
    session_id: String,
    config: Arc<SessionConfig>,
    preview: Arc<dyn PreviewSink>,

    devices: DeviceManager,
    capture: Option<CaptureSession>,

    /// Bumped by every acquisition and release; stale permission
    /// completions compare against it
    generation: u64,

    state: RecordingState,

    /// Bumped whenever the countdown/elapsed timers must stop acting
    epoch: u64,

    take: Option<ActiveTake>,
    countdown_task: Option<JoinHandle<()>>,
    elapsed_task: Option<JoinHandle<()>>,

    /// Last take id handed out, and the take the stored artifact came from
    takes: u64,
    stored_take: u64,

    /// Collectors of stopped takes. They survive releases so a stopped
    /// take always produces its artifact.
    flushing: Vec<JoinHandle<()>>,
    flushing_tx: watch::Sender<usize>,

    volume: VolumeMonitor,
    artifact: Option<RecordedArtifact>,
    playback: PlaybackPresenter,
    submitted: bool,
    last_error: Option<String>,
}

impl RecordingSession {
    /// Create a new recording session
    pub fn new(config: SessionConfig, platform: MediaPlatform) -> Result<Self> {
        config.validate()?;

        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        info!("Creating recording session: {}", session_id);

        let volume = VolumeMonitor::new();
        let volume_rx = volume.subscribe();
        let (flushing_tx, flushing_rx) = watch::channel(0);

        let inner = Inner {
            session_id: session_id.clone(),
            config: Arc::new(config),
            preview: platform.preview,
            devices: DeviceManager::new(),
            capture: None,
            generation: 0,
            state: RecordingState::Idle,
            epoch: 0,
            take: None,
            countdown_task: None,
            elapsed_task: None,
            takes: 0,
            stored_take: 0,
            flushing: Vec::new(),
            flushing_tx,
            volume,
            artifact: None,
            playback: PlaybackPresenter::new(platform.urls, platform.playback),
            submitted: false,
            last_error: None,
        };

        Ok(Self {
            session_id,
            devices: platform.devices,
            inner: Arc::new(Mutex::new(inner)),
            volume_rx,
            flushing_rx,
        })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Volume meter readings (0-100), updated once per display frame
    pub fn volume(&self) -> watch::Receiver<u8> {
        self.volume_rx.clone()
    }

    /// Request camera and microphone access for the given devices
    ///
    /// `None` lets the platform choose. Any live capture session is released
    /// before the request is made.
    pub async fn request_access(
        &self,
        video_id: Option<&str>,
        audio_id: Option<&str>,
    ) -> Result<AccessOutcome> {
        self.acquire(StreamConstraints {
            video_device_id: video_id.map(str::to_string),
            audio_device_id: audio_id.map(str::to_string),
        })
        .await
    }

    /// Request access for the currently selected devices
    pub async fn ask_permission(&self) -> Result<AccessOutcome> {
        let constraints = self.inner.lock().await.devices.constraints();
        self.acquire(constraints).await
    }

    /// Switch camera or microphone, re-acquiring the stream
    pub async fn change_device(&self, kind: DeviceKind, id: &str) -> Result<AccessOutcome> {
        let constraints = {
            let mut inner = self.inner.lock().await;
            if !inner.devices.contains(kind, id) {
                warn!("Ignoring selection of unknown {} device {}", kind.as_str(), id);
                return Err(MediaError::DeviceUnavailable(format!(
                    "no {} device with id {}",
                    kind.as_str(),
                    id
                )));
            }

            info!("Switching {} device to {}", kind.as_str(), id);
            inner.release();
            inner.devices.select(kind, id);
            inner.devices.constraints()
        };

        self.acquire(constraints).await
    }

    /// Re-enumerate devices after the platform reports a change
    ///
    /// Re-acquires the stream if a live session lost its selected device.
    pub async fn refresh_devices(&self) -> Result<()> {
        let enumerated = self.devices.enumerate_devices().await;

        let reacquire = {
            let mut inner = self.inner.lock().await;
            let changed = match enumerated {
                Ok(devices) => inner.devices.update(devices),
                Err(e) => {
                    warn!("Device enumeration failed: {}", e);
                    inner.devices.clear_lists();
                    false
                }
            };

            (changed && inner.capture.is_some()).then(|| inner.devices.constraints())
        };

        if let Some(constraints) = reacquire {
            info!("Selected device disappeared, re-acquiring stream");
            self.acquire(constraints).await?;
        }

        Ok(())
    }

    async fn acquire(&self, constraints: StreamConstraints) -> Result<AccessOutcome> {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.release();
            inner.generation += 1;
            inner.generation
        };

        info!(
            "Requesting media access (video={:?}, audio={:?})",
            constraints.video_device_id, constraints.audio_device_id
        );

        let mut stream = match self.devices.get_user_media(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to acquire media stream: {}", e);
                let mut inner = self.inner.lock().await;
                if inner.generation == generation {
                    inner.last_error = Some(e.to_string());
                }
                return Err(e);
            }
        };

        if self.inner.lock().await.generation != generation {
            warn!("Stream {} arrived after its request was superseded", stream.id());
            stream.stop_tracks();
            return Ok(AccessOutcome::Superseded);
        }

        let enumerated = self.devices.enumerate_devices().await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            warn!("Stream {} superseded during enumeration", stream.id());
            stream.stop_tracks();
            return Ok(AccessOutcome::Superseded);
        }

        // Selection follows the hardware the platform actually opened
        let held_video = stream
            .device_id(DeviceKind::Video)
            .or(constraints.video_device_id.as_deref());
        let held_audio = stream
            .device_id(DeviceKind::Audio)
            .or(constraints.audio_device_id.as_deref());
        inner.devices.set_selected(DeviceKind::Video, held_video);
        inner.devices.set_selected(DeviceKind::Audio, held_audio);

        match enumerated {
            Ok(devices) => {
                inner.devices.update(devices);
            }
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                inner.devices.clear_lists();
            }
        }

        let capture = CaptureSession::new(stream);
        let stream_id = capture.id().to_string();

        inner.preview.bind_stream(Some(stream_id.as_str()));

        let config = Arc::clone(&inner.config);
        match capture.stream().create_analyser(config.fft_size) {
            Ok(analyser) => inner.volume.start(analyser, config.volume_frame),
            Err(e) => warn!("Volume meter unavailable: {}", e),
        }

        inner.capture = Some(capture);
        inner.submitted = false;
        inner.last_error = None;

        info!("Media access granted: {}", stream_id);
        Ok(AccessOutcome::Granted { stream_id })
    }

    /// Release the capture session, its timers and any active recording
    ///
    /// Safe to call repeatedly.
    pub async fn release(&self) {
        self.inner.lock().await.release();
    }

    /// Begin the countdown; recording starts when it reaches zero
    ///
    /// Returns false (and does nothing) without a live capture session or
    /// while a countdown/recording is already running.
    pub async fn start(&self) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.capture.is_none() {
            warn!("Cannot start recording: no live capture session");
            return false;
        }
        if !inner.state.can_start() {
            warn!("Recording already started ({})", inner.state.as_str());
            return false;
        }

        inner.epoch += 1;
        let epoch = inner.epoch;
        let countdown = inner.config.countdown_secs;
        let tick = inner.config.tick;

        inner.state = RecordingState::CountingDown(countdown);
        inner.last_error = None;
        info!("Recording countdown started: {}", countdown);

        let weak = Arc::downgrade(&self.inner);
        inner.countdown_task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);

            loop {
                ticker.tick().await;

                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let mut inner = shared.lock().await;
                if inner.epoch != epoch {
                    return;
                }

                match inner.state {
                    RecordingState::CountingDown(n) if n > 1 => {
                        inner.state = RecordingState::CountingDown(n - 1);
                        debug!("Countdown: {}", n - 1);
                    }
                    RecordingState::CountingDown(_) => {
                        // our own handle; dropping it detaches rather than aborts
                        inner.countdown_task = None;
                        inner.begin_recording(&weak, epoch);
                        return;
                    }
                    _ => return,
                }
            }
        }));

        true
    }

    /// Stop recording; the artifact follows once the recorder has flushed
    ///
    /// Returns false (and does nothing) unless currently recording.
    pub async fn stop(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let elapsed = match inner.state {
            RecordingState::Recording(secs) => secs,
            other => {
                warn!("Recording not active ({})", other.as_str());
                return Ok(false);
            }
        };

        info!("Stopping recording after {}s", elapsed);

        inner.epoch += 1;
        if let Some(task) = inner.elapsed_task.take() {
            task.abort();
        }

        inner.state = RecordingState::Stopped;

        let Some(mut take) = inner.take.take() else {
            return Ok(true);
        };

        if let Err(e) = take.recorder.stop() {
            take.collector.abort();
            inner.fail(e.clone());
            return Err(e);
        }

        // The collector may already have given up on a failed take
        let _ = take.duration_tx.send(elapsed);

        inner.flushing.retain(|task| !task.is_finished());
        inner.flushing.push(take.collector);
        inner.flushing_tx.send_modify(|pending| *pending += 1);

        Ok(true)
    }

    /// Wait until every stopped take has been flushed, then return the
    /// finished recording
    pub async fn wait_for_artifact(&self) -> Option<RecordedArtifact> {
        let mut pending = self.flushing_rx.clone();
        loop {
            if *pending.borrow_and_update() == 0 {
                break;
            }
            if pending.changed().await.is_err() {
                break;
            }
        }
        self.artifact().await
    }

    /// Hand over the finished recording and end device access
    ///
    /// The artifact stays available for local playback. Returns false
    /// (and does nothing) if no artifact exists yet.
    pub async fn submit(&self) -> bool {
        let mut inner = self.inner.lock().await;

        let Some(artifact_id) = inner.artifact.as_ref().map(|a| a.id) else {
            warn!("Nothing to submit: no recording yet");
            return false;
        };

        inner.submitted = true;
        inner.release();

        info!("Recording {} submitted", artifact_id);
        true
    }

    /// Throw away the finished recording
    ///
    /// Returns false (and does nothing) without an artifact or while a
    /// countdown/recording is running.
    pub async fn discard(&self) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.state.is_busy() {
            warn!("Cannot discard while {}", inner.state.as_str());
            return false;
        }

        match inner.artifact.take() {
            Some(artifact) => {
                inner.playback.teardown();
                inner.submitted = false;
                info!("Recording {} discarded", artifact.id);
                true
            }
            None => {
                warn!("Nothing to discard");
                false
            }
        }
    }

    /// The finished recording, if any
    pub async fn artifact(&self) -> Option<RecordedArtifact> {
        self.inner.lock().await.artifact.clone()
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Release everything, including the playback reference
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.release();
        inner.abort_flushing();
        inner.playback.teardown();
        info!("Recording session {} shut down", self.session_id);
    }
}

// Spawned tasks only hold a `Weak` to the state, so dropping the session
// drops `Inner`, which releases everything below
impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
        self.abort_flushing();
    }
}

impl Inner {
    /// Stop timers and recorder; an unfinished recording is thrown away
    fn cancel_recording(&mut self) {
        self.epoch += 1;

        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
        if let Some(task) = self.elapsed_task.take() {
            task.abort();
        }

        if let Some(mut take) = self.take.take() {
            take.collector.abort();
            if take.recorder.is_recording() {
                if let Err(e) = take.recorder.stop() {
                    warn!("Failed to stop recorder: {}", e);
                }
            }
        }

        if self.state.is_busy() {
            info!("Recording cancelled ({})", self.state.as_str());
            self.state = RecordingState::Idle;
        }
    }

    fn release(&mut self) {
        self.generation += 1;
        self.cancel_recording();
        self.volume.stop();

        if let Some(capture) = self.capture.take() {
            self.preview.bind_stream(None);
            capture.close();
            info!("Recording session {} released its devices", self.session_id);
        }
    }

    fn abort_flushing(&mut self) {
        for task in self.flushing.drain(..) {
            task.abort();
        }
        self.flushing_tx.send_replace(0);
    }

    fn flush_done(&mut self) {
        self.flushing_tx.send_modify(|pending| *pending = pending.saturating_sub(1));
    }

    /// Recorder or track failure: fatal for the recording and the capture
    fn fail(&mut self, e: MediaError) {
        error!("Recording failed: {}", e);
        self.release();
        self.state = RecordingState::Idle;
        self.last_error = Some(e.to_string());
    }

    /// Countdown expired: start the recorder and the elapsed-time tick
    fn begin_recording(&mut self, shared: &Weak<Mutex<Inner>>, epoch: u64) {
        let config = Arc::clone(&self.config);

        let created = match self.capture.as_ref() {
            Some(capture) => capture.stream().create_recorder(&config.mime_type),
            None => {
                self.state = RecordingState::Idle;
                return;
            }
        };

        let mut recorder = match created {
            Ok(recorder) => recorder,
            Err(e) => return self.fail(e),
        };

        let events = match recorder.start(config.timeslice) {
            Ok(events) => events,
            Err(e) => return self.fail(e),
        };

        self.takes += 1;
        let take_id = self.takes;
        let (duration_tx, duration_rx) = oneshot::channel();
        let collector = Self::spawn_collector(
            Weak::clone(shared),
            take_id,
            &config.mime_type,
            events,
            duration_rx,
        );

        self.take = Some(ActiveTake {
            id: take_id,
            recorder,
            duration_tx,
            collector,
        });
        self.state = RecordingState::Recording(0);
        info!("Recording {} started ({})", take_id, config.mime_type);

        self.elapsed_task = Some(Self::spawn_elapsed_tick(Weak::clone(shared), epoch, config.tick));
    }

    fn spawn_elapsed_tick(
        weak: Weak<Mutex<Inner>>,
        epoch: u64,
        tick: std::time::Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);

            loop {
                ticker.tick().await;

                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let mut inner = shared.lock().await;
                if inner.epoch != epoch {
                    return;
                }
                match inner.state {
                    RecordingState::Recording(secs) => {
                        inner.state = RecordingState::Recording(secs + 1);
                    }
                    _ => return,
                }
            }
        })
    }

    /// Drain one take's fragments into an artifact
    ///
    /// A take cancelled mid-recording aborts its collector. Once the take
    /// is stopped the collector runs to completion even if the capture
    /// session is released in the meantime.
    fn spawn_collector(
        weak: Weak<Mutex<Inner>>,
        take_id: u64,
        mime_type: &str,
        events: mpsc::Receiver<RecorderEvent>,
        duration_rx: oneshot::Receiver<u64>,
    ) -> JoinHandle<()> {
        let mut collector = ChunkCollector::new(mime_type);

        tokio::spawn(async move {
            let result = collector.collect(events).await;
            let duration = match result {
                Ok(()) => duration_rx.await.ok(),
                Err(_) => None,
            };

            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().await;
            let active = inner.take.as_ref().is_some_and(|take| take.id == take_id);

            match (result, duration) {
                (Ok(()), Some(secs)) => {
                    inner.flush_done();
                    if take_id > inner.stored_take {
                        inner.stored_take = take_id;
                        inner.store_artifact(collector.finalize(secs));
                    } else {
                        debug!("Recording {} superseded by a later take", take_id);
                    }
                }
                (Ok(()), None) => debug!("Recording {} was cancelled", take_id),
                (Err(e), _) if active => inner.fail(e),
                (Err(e), _) => {
                    error!("Recording {} failed while flushing: {}", take_id, e);
                    inner.flush_done();
                    inner.last_error = Some(e.to_string());
                    if inner.state == RecordingState::Stopped && inner.artifact.is_none() {
                        inner.state = RecordingState::Idle;
                    }
                }
            }
        })
    }

    fn store_artifact(&mut self, artifact: RecordedArtifact) {
        info!(
            "Recording {} ready: {} bytes, {}s",
            artifact.id,
            artifact.size_bytes(),
            artifact.duration_secs
        );

        self.playback.present(&artifact);
        self.artifact = Some(artifact);
        self.submitted = false;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            countdown: self.state.countdown(),
            elapsed_secs: self.state.elapsed_secs(),
            volume: self.volume.current(),
            stream_id: self.capture.as_ref().map(|c| c.id().to_string()),
            video_devices: self.devices.devices(DeviceKind::Video).to_vec(),
            audio_devices: self.devices.devices(DeviceKind::Audio).to_vec(),
            selected_video: self.devices.selected(DeviceKind::Video).map(str::to_string),
            selected_audio: self.devices.selected(DeviceKind::Audio).map(str::to_string),
            video_selector: self.devices.selector_label(DeviceKind::Video),
            audio_selector: self.devices.selector_label(DeviceKind::Audio),
            artifact: self.artifact.as_ref().map(RecordedArtifact::info),
            playback_url: self.playback.current_url().map(str::to_string),
            submitted: self.submitted,
            last_error: self.last_error.clone(),
        }
    }
}
