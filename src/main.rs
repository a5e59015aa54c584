use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webcam_recorder::{Config, DeviceKind, RecordingSession, SessionConfig, SimulatedPlatform};

/// Run a scripted recording session against the simulated media platform
#[derive(Debug, Parser)]
#[command(name = "webcam-recorder", version)]
struct Args {
    /// Config file (extension optional)
    #[arg(long)]
    config: Option<String>,

    /// Camera id to switch to after permission is granted
    #[arg(long)]
    camera: Option<String>,

    /// Microphone id to switch to after permission is granted
    #[arg(long)]
    microphone: Option<String>,

    /// Seconds to record once the countdown finishes
    #[arg(long, default_value_t = 5)]
    record_secs: u64,

    /// Simulate the user refusing the permission prompt
    #[arg(long)]
    deny_permission: bool,

    /// Simulate a machine without camera or microphone
    #[arg(long)]
    no_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let session_config = match &args.config {
        Some(path) => {
            let cfg = Config::load(path)?;
            info!("Loaded config: {}", cfg.service.name);
            cfg.recorder.session_config()
        }
        None => SessionConfig::default(),
    };

    let simulated = if args.no_devices {
        SimulatedPlatform::new(Vec::new())
    } else {
        SimulatedPlatform::with_default_devices()
    };
    simulated.devices.set_deny_permission(args.deny_permission);
    simulated.devices.set_input_level(96);

    let countdown = session_config.tick * session_config.countdown_secs;
    let tick = session_config.tick;
    let session = RecordingSession::new(session_config, simulated.platform())
        .context("Failed to create recording session")?;

    info!("Webcam Recorder v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = session.ask_permission().await {
        warn!("No capture session: {} (re-run to ask again)", e);
        print_snapshot(&session).await?;
        return Ok(());
    }

    if let Some(camera) = &args.camera {
        session.change_device(DeviceKind::Video, camera).await?;
    }
    if let Some(microphone) = &args.microphone {
        session.change_device(DeviceKind::Audio, microphone).await?;
    }

    if !session.start().await {
        warn!("Recording could not be started");
        print_snapshot(&session).await?;
        return Ok(());
    }

    tokio::time::sleep(countdown + Duration::from_millis(50)).await;
    for _ in 0..args.record_secs {
        tokio::time::sleep(tick).await;
        let snapshot = session.snapshot().await;
        info!(
            "Recording: {}s, volume {}%",
            snapshot.elapsed_secs, snapshot.volume
        );
    }

    session.stop().await?;

    match session.wait_for_artifact().await {
        Some(artifact) => info!(
            "Recorded {} bytes in {} fragments",
            artifact.size_bytes(),
            artifact.fragment_count
        ),
        None => warn!("Recording produced no artifact"),
    }

    if session.submit().await {
        info!("Recording submitted");
    }

    print_snapshot(&session).await?;
    session.shutdown().await;

    Ok(())
}

async fn print_snapshot(session: &RecordingSession) -> Result<()> {
    let snapshot = session.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
