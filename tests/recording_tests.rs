// Integration tests for the countdown -> record -> stop -> artifact lifecycle
//
// These tests run against the simulated media platform with tokio's clock
// paused, so every timer fires deterministically.

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use webcam_recorder::{
    DeviceKind, MediaError, RecordingSession, RecordingState, SessionConfig, SimulatedPlatform,
};

const SETTLE: Duration = Duration::from_millis(10);

fn new_session(sim: &SimulatedPlatform) -> Result<RecordingSession> {
    Ok(RecordingSession::new(SessionConfig::default(), sim.platform())?)
}

/// Start, wait out the countdown, record `secs`, stop and let the recorder flush
async fn record_cycle(session: &RecordingSession, secs: u64) -> Result<()> {
    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;
    sleep(Duration::from_secs(secs)).await;
    assert!(session.stop().await?);
    sleep(SETTLE).await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_full_recording_scenario() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;

    session.request_access(Some("cam-1"), Some("mic-1")).await?;
    assert!(session.start().await);

    // Countdown 3, 2, 1 on the one-second tick
    assert_eq!(session.state().await, RecordingState::CountingDown(3));
    sleep(Duration::from_secs(1) + SETTLE).await;
    assert_eq!(session.state().await, RecordingState::CountingDown(2));
    sleep(Duration::from_secs(1)).await;
    assert_eq!(session.state().await, RecordingState::CountingDown(1));

    // Recording begins when the countdown expires, elapsed starts at 0
    sleep(Duration::from_secs(1)).await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Recording(0));
    assert_eq!(snapshot.elapsed_secs, 0);
    assert_eq!(snapshot.countdown, None);

    for expected in 1..=5 {
        sleep(Duration::from_secs(1)).await;
        assert_eq!(session.snapshot().await.elapsed_secs, expected);
    }

    assert!(session.stop().await?);

    // Elapsed display resets immediately, before the artifact arrives
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Stopped);
    assert_eq!(snapshot.elapsed_secs, 0);

    sleep(SETTLE).await;

    let artifact = session.artifact().await.expect("artifact after stop");
    assert_eq!(artifact.mime_type, "video/webm");
    assert_eq!(artifact.duration_secs, 5);
    // Five timeslices plus the final flush, concatenated in order
    assert_eq!(artifact.fragment_count, 6);
    assert!(artifact.data.starts_with(b"chunk-000;chunk-001;"));
    assert!(artifact.data.ends_with(b"chunk-005;"));

    assert_eq!(session.snapshot().await.elapsed_secs, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_live_session() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;

    assert!(!session.start().await, "No capture session yet");
    assert_eq!(session.state().await, RecordingState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_transitions_are_noops() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    // stop/submit before anything was recorded
    assert!(!session.stop().await?);
    assert!(!session.submit().await);
    assert_eq!(session.state().await, RecordingState::Idle);

    // start twice: the second is ignored, the countdown is not restarted
    assert!(session.start().await);
    sleep(Duration::from_secs(1) + SETTLE).await;
    assert!(!session.start().await);
    assert_eq!(session.state().await, RecordingState::CountingDown(2));

    // stop during the countdown is ignored too
    assert!(!session.stop().await?);
    assert_eq!(session.state().await, RecordingState::CountingDown(2));

    // start while recording is ignored
    sleep(Duration::from_secs(2)).await;
    assert_eq!(session.state().await, RecordingState::Recording(0));
    assert!(!session.start().await);

    // discard is refused mid-recording
    assert!(!session.discard().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_second_recording_replaces_artifact() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    record_cycle(&session, 2).await?;
    let first = session.artifact().await.expect("first artifact");
    let first_url = session.snapshot().await.playback_url.expect("first url");

    // Stopped -> start is allowed
    record_cycle(&session, 3).await?;
    let second = session.artifact().await.expect("second artifact");
    let snapshot = session.snapshot().await;
    let second_url = snapshot.playback_url.expect("second url");

    assert_ne!(first.id, second.id);
    assert_eq!(second.duration_secs, 3);
    assert_eq!(snapshot.artifact.map(|a| a.id), Some(second.id));

    // Exactly one temporary reference is live, and it is the new one
    assert_ne!(first_url, second_url);
    assert_eq!(sim.urls.live_count(), 1);
    assert!(sim.urls.resolve(&first_url).is_none());
    assert_eq!(sim.playback.bound(), Some(second_url.clone()));

    let (mime, data) = sim.urls.resolve(&second_url).expect("live url");
    assert_eq!(mime, "video/webm");
    assert_eq!(&data[..], &second.data[..]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_submit_releases_devices_and_keeps_artifact() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;
    record_cycle(&session, 2).await?;

    assert!(session.submit().await);

    let snapshot = session.snapshot().await;
    assert!(snapshot.submitted);
    assert!(!snapshot.has_session());
    assert!(!snapshot.can_start());
    assert!(snapshot.artifact.is_some());
    assert!(snapshot.playback_url.is_some(), "Artifact stays playable");
    assert_eq!(sim.devices.held_streams(), 0);
    assert_eq!(sim.devices.open_analysers(), 0);
    assert_eq!(sim.preview.bound(), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_submit_stops_recording_in_progress() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;
    record_cycle(&session, 1).await?;
    let first = session.artifact().await.expect("artifact");

    // A second take is under way when the user submits the first
    assert!(session.start().await);
    sleep(Duration::from_secs(4)).await;
    assert!(matches!(session.state().await, RecordingState::Recording(_)));

    assert!(session.submit().await);
    sleep(Duration::from_secs(2)).await;

    assert_eq!(session.state().await, RecordingState::Idle);
    assert_eq!(session.artifact().await.map(|a| a.id), Some(first.id));
    assert_eq!(sim.devices.held_streams(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_right_after_stop_keeps_recording() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.request_access(Some("cam-1"), Some("mic-1")).await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;
    sleep(Duration::from_secs(5)).await;
    assert!(session.stop().await?);

    // Released before the recorder has flushed
    session.release().await;
    assert_eq!(sim.devices.held_streams(), 0);

    let artifact = session.wait_for_artifact().await.expect("artifact after stop");
    assert_eq!(artifact.duration_secs, 5);
    assert_eq!(artifact.fragment_count, 6);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Stopped);
    assert!(snapshot.playback_url.is_some());
    assert!(!snapshot.has_session());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_device_switch_right_after_stop_keeps_recording() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.request_access(Some("cam-1"), Some("mic-1")).await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;
    sleep(Duration::from_secs(5)).await;
    assert!(session.stop().await?);

    session.change_device(DeviceKind::Video, "cam-2").await?;
    sleep(SETTLE).await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Stopped);
    assert_eq!(snapshot.artifact.map(|a| a.duration_secs), Some(5));
    assert_eq!(
        sim.devices.held_devices(),
        vec![("cam-2".to_string(), "mic-1".to_string())]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_artifact() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    // Nothing pending: returns at once
    assert!(session.wait_for_artifact().await.is_none());

    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;
    sleep(Duration::from_secs(2)).await;
    assert!(session.stop().await?);

    let artifact = session.wait_for_artifact().await.expect("flushed artifact");
    assert_eq!(artifact.duration_secs, 2);
    assert!(session.submit().await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_releases_devices() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;
    drop(session);

    assert_eq!(sim.devices.held_streams(), 0);
    assert_eq!(sim.devices.open_analysers(), 0);
    assert_eq!(sim.preview.bound(), None);

    // Orphaned ticks find nothing to act on
    sleep(Duration::from_secs(3)).await;
    assert_eq!(sim.devices.held_streams(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_discard_revokes_playback() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;
    record_cycle(&session, 1).await?;

    assert!(session.discard().await);
    assert!(!session.discard().await, "Nothing left to discard");

    let snapshot = session.snapshot().await;
    assert!(snapshot.artifact.is_none());
    assert!(snapshot.playback_url.is_none());
    assert_eq!(sim.urls.live_count(), 0);
    assert_eq!(sim.playback.bound(), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_during_countdown_cancels_timers() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(1) + SETTLE).await;
    session.release().await;

    // The countdown must not fire after release
    sleep(Duration::from_secs(5)).await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Idle);
    assert!(snapshot.artifact.is_none());
    assert_eq!(sim.devices.held_streams(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_device_switch_during_recording_discards_take() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(5)).await;
    assert!(matches!(session.state().await, RecordingState::Recording(_)));

    session.change_device(DeviceKind::Video, "cam-2").await?;
    sleep(Duration::from_secs(2)).await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Idle);
    assert_eq!(snapshot.elapsed_secs, 0);
    assert!(snapshot.artifact.is_none());
    assert_eq!(sim.devices.held_streams(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_track_failure_mid_recording_is_fatal() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;

    assert!(session.start().await);
    sleep(Duration::from_secs(5)).await;

    sim.devices.end_tracks();
    sleep(Duration::from_secs(2)).await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Idle);
    assert!(snapshot.artifact.is_none(), "Partial recording is discarded");
    assert!(!snapshot.has_session());
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Track ended")));
    assert_eq!(sim.devices.held_streams(), 0);
    assert_eq!(sim.devices.open_analysers(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recorder_unavailable_when_countdown_expires() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;
    sim.devices.set_fail_recorder(true);

    assert!(session.start().await);
    sleep(Duration::from_secs(3) + SETTLE).await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, RecordingState::Idle);
    assert!(!snapshot.has_session());
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Recorder error")));

    // Recovery is user-initiated
    sim.devices.set_fail_recorder(false);
    session.ask_permission().await?;
    assert!(session.snapshot().await.last_error.is_none());
    record_cycle(&session, 1).await?;
    assert!(session.artifact().await.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_revokes_everything() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let session = new_session(&sim)?;
    session.ask_permission().await?;
    record_cycle(&session, 1).await?;

    session.shutdown().await;

    assert_eq!(sim.urls.live_count(), 0);
    assert_eq!(sim.devices.held_streams(), 0);
    assert_eq!(sim.devices.open_analysers(), 0);
    assert_eq!(sim.playback.bound(), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_custom_countdown_length() -> Result<()> {
    let sim = SimulatedPlatform::with_default_devices();
    let config = SessionConfig {
        countdown_secs: 1,
        ..SessionConfig::default()
    };
    let session = RecordingSession::new(config, sim.platform())?;
    session.ask_permission().await?;

    assert!(session.start().await);
    assert_eq!(session.state().await, RecordingState::CountingDown(1));
    sleep(Duration::from_secs(1) + SETTLE).await;
    assert_eq!(session.state().await, RecordingState::Recording(0));
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let sim = SimulatedPlatform::with_default_devices();
    let config = SessionConfig {
        fft_size: 0,
        ..SessionConfig::default()
    };

    let result = RecordingSession::new(config, sim.platform());
    assert!(matches!(result, Err(MediaError::Config(_))));
}
