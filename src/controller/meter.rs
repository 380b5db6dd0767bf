use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::device::AudioFrame;
use crate::notify::{Notification, NotificationSink};

/// Reports microphone loudness for the bound stream
///
/// Dropping the meter stops it.
pub struct LevelMeter {
    task: JoinHandle<()>,
}

impl LevelMeter {
    pub fn start(mut frames: broadcast::Receiver<AudioFrame>, notifier: Arc<dyn NotificationSink>) -> Self {
        let task = tokio::spawn(async move {
            debug!("Level meter started");
            loop {
                match frames.recv().await {
                    Ok(frame) => notifier.notify(Notification::DeviceLevel(average_level(&frame.samples))),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Level meter stopped");
        });

        Self { task }
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Mean absolute amplitude scaled to 0..=100
pub fn average_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples.iter().map(|&s| (s as f64).abs()).sum();
    let mean = sum / samples.len() as f64;
    (mean / i16::MAX as f64 * 100.0).min(100.0) as f32
}
