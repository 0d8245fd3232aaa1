// Advisory microphone level meter
//
// Samples the latest frame from an audio backend at animation-frame cadence
// and publishes a normalized amplitude on a watch channel. Nothing here feeds
// a correctness decision; when no audio graph is available the meter reports
// a constant zero.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioFrame};

/// ~60 Hz, one sample per display frame
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(16);

pub struct AudioLevelMonitor {
    level_tx: watch::Sender<f32>,
    task: Option<JoinHandle<()>>,
}

impl AudioLevelMonitor {
    /// A meter with no audio graph behind it
    pub fn silent() -> Self {
        let (level_tx, _) = watch::channel(0.0);
        Self {
            level_tx,
            task: None,
        }
    }

    /// Start metering `backend`. A missing or failing backend degrades to
    /// [`AudioLevelMonitor::silent`] instead of returning an error.
    pub async fn start(backend: Option<Box<dyn AudioBackend>>, cadence: Duration) -> Self {
        let mut monitor = Self::silent();

        let Some(mut backend) = backend else {
            info!("No audio graph available, level meter reports zero");
            return monitor;
        };

        let frames = match backend.start().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(
                    "Audio backend {} unavailable, level meter reports zero: {}",
                    backend.name(),
                    e
                );
                return monitor;
            }
        };

        info!("Level meter started on {} ({:?} cadence)", backend.name(), cadence);

        let level_tx = monitor.level_tx.clone();
        monitor.task = Some(tokio::spawn(async move {
            Self::run(frames, level_tx, cadence).await;
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop audio backend: {}", e);
            }
        }));

        monitor
    }

    async fn run(
        mut frames: mpsc::Receiver<AudioFrame>,
        level_tx: watch::Sender<f32>,
        cadence: Duration,
    ) {
        let mut ticker = tokio::time::interval(cadence.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut latest = 0.0f32;
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => latest = frame.level(),
                    None => break,
                },
                _ = ticker.tick() => {
                    level_tx.send_if_modified(|current| {
                        if (*current - latest).abs() > f32::EPSILON {
                            *current = latest;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        }

        level_tx.send_replace(0.0);
        debug!("Level meter source ended");
    }

    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    pub fn level(&self) -> f32 {
        *self.level_tx.borrow()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.level_tx.send_replace(0.0);
    }
}

impl Drop for AudioLevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
