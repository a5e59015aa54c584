use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MediaError, Result};

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Countdown shown before recording starts, in ticks
    /// Default: 3
    pub countdown_secs: u32,

    /// Period of the countdown and elapsed-time ticks
    /// Default: 1 second
    pub tick: Duration,

    /// Volume meter sampling period (one display frame)
    /// Default: 16ms (~60 Hz)
    pub volume_frame: Duration,

    /// FFT size for the volume analyser (bins = fft_size / 2)
    pub fft_size: usize,

    /// How often the recorder emits a data fragment
    pub timeslice: Duration,

    /// Container format requested from the recorder
    pub mime_type: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            tick: Duration::from_secs(1),
            volume_frame: Duration::from_millis(16),
            fft_size: 256,
            timeslice: Duration::from_secs(1),
            mime_type: "video/webm".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.countdown_secs == 0 {
            return Err(MediaError::Config("countdown_secs must be at least 1".to_string()));
        }
        if self.tick.is_zero() || self.volume_frame.is_zero() || self.timeslice.is_zero() {
            return Err(MediaError::Config(
                "tick, volume_frame and timeslice must be non-zero".to_string(),
            ));
        }
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(MediaError::Config(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if self.mime_type.trim().is_empty() {
            return Err(MediaError::Config("mime_type must not be empty".to_string()));
        }
        Ok(())
    }
}
