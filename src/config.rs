use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recorder: RecorderSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

/// `[recorder]` table; every key is optional
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub countdown_secs: u32,
    pub tick_ms: u64,
    pub volume_frame_ms: u64,
    pub fft_size: usize,
    pub timeslice_ms: u64,
    pub mime_type: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            countdown_secs: defaults.countdown_secs,
            tick_ms: defaults.tick.as_millis() as u64,
            volume_frame_ms: defaults.volume_frame.as_millis() as u64,
            fft_size: defaults.fft_size,
            timeslice_ms: defaults.timeslice.as_millis() as u64,
            mime_type: defaults.mime_type,
        }
    }
}

impl RecorderSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            countdown_secs: self.countdown_secs,
            tick: Duration::from_millis(self.tick_ms),
            volume_frame: Duration::from_millis(self.volume_frame_ms),
            fft_size: self.fft_size,
            timeslice: Duration::from_millis(self.timeslice_ms),
            mime_type: self.mime_type.clone(),
        }
    }
}

impl Config {
    /// Load `path` (extension optional) with `WEBCAM_RECORDER__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("WEBCAM_RECORDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.recorder
            .session_config()
            .validate()
            .context("Invalid [recorder] settings")?;

        Ok(cfg)
    }
}
