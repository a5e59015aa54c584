use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::media::AudioAnalyser;

/// Scale the mean of byte frequency magnitudes (0-255) to a 0-100 meter
pub fn volume_level(bins: &[u8]) -> u8 {
    if bins.is_empty() {
        return 0;
    }

    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let mean = sum as f64 / bins.len() as f64;
    (mean * 100.0 / 255.0).round().min(100.0) as u8
}

/// Continuous microphone level sampling for the volume meter
///
/// Owns the analyser and its sampling loop; `stop` cancels the loop and
/// closes the analyser on every exit path.
pub struct VolumeMonitor {
    level_tx: watch::Sender<u8>,
    analyser: Option<Arc<Mutex<Box<dyn AudioAnalyser>>>>,
    task: Option<JoinHandle<()>>,
}

impl VolumeMonitor {
    pub fn new() -> Self {
        let (level_tx, _) = watch::channel(0);
        Self {
            level_tx,
            analyser: None,
            task: None,
        }
    }

    /// Subscribe to meter readings
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.level_tx.subscribe()
    }

    pub fn current(&self) -> u8 {
        *self.level_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Tear down any previous analyser and start sampling `analyser`
    pub fn start(&mut self, analyser: Box<dyn AudioAnalyser>, frame: Duration) {
        self.stop();

        let analyser = Arc::new(Mutex::new(analyser));
        let level_tx = self.level_tx.clone();
        let sampled = Arc::clone(&analyser);

        let task = tokio::spawn(async move {
            debug!("Volume sampling loop started");

            let mut bins = {
                let analyser = sampled.lock().unwrap_or_else(PoisonError::into_inner);
                vec![0u8; analyser.frequency_bin_count()]
            };
            let mut ticker = tokio::time::interval(frame);

            loop {
                ticker.tick().await;

                let result = {
                    let mut analyser = sampled.lock().unwrap_or_else(PoisonError::into_inner);
                    analyser.byte_frequency_data(&mut bins)
                };

                match result {
                    Ok(()) => {
                        level_tx.send_replace(volume_level(&bins));
                    }
                    Err(e) => {
                        warn!("Volume sampling stopped: {}", e);
                        level_tx.send_replace(0);
                        break;
                    }
                }
            }
        });

        self.analyser = Some(analyser);
        self.task = Some(task);
        info!("Volume monitor started");
    }

    /// Cancel the loop, close the analyser and zero the meter
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        if let Some(analyser) = self.analyser.take() {
            analyser
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .close();
            info!("Volume monitor stopped");
        }

        self.level_tx.send_replace(0);
    }
}

impl Default for VolumeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VolumeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
