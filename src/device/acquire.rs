use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

use super::backend::{CaptureBackend, DeviceInfo, MediaConstraints, MediaStream};
use crate::error::CaptureResult;

/// Wraps device acquisition and lazily installs the device-change hook
///
/// Labels and change notifications are only meaningful once permission has
/// been granted, so the hook is installed after the first successful
/// acquisition and never again.
pub struct StreamAcquirer {
    backend: Arc<dyn CaptureBackend>,
    hook_installed: AtomicBool,
    device_changed: Arc<Notify>,
}

impl StreamAcquirer {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        info!("Stream acquirer using backend: {}", backend.name());

        Self {
            backend,
            hook_installed: AtomicBool::new(false),
            device_changed: Arc::new(Notify::new()),
        }
    }

    pub async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        let stream = self.backend.acquire(constraints).await?;

        if !self.hook_installed.swap(true, Ordering::SeqCst) {
            self.install_hook();
        }

        Ok(stream)
    }

    pub async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>> {
        self.backend.enumerate_devices().await
    }

    /// Signalled whenever the backend reports a device change
    ///
    /// Bursts of changes collapse into a single wake-up.
    pub fn device_changed(&self) -> Arc<Notify> {
        Arc::clone(&self.device_changed)
    }

    pub fn hook_installed(&self) -> bool {
        self.hook_installed.load(Ordering::SeqCst)
    }

    fn install_hook(&self) {
        let Some(mut changes) = self.backend.device_changes() else {
            debug!("Backend {} has no device change feed", self.backend.name());
            return;
        };

        info!("Installing device change hook");

        let notify = Arc::clone(&self.device_changed);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        debug!("Device change detected");
                        notify.notify_one();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Device change feed closed");
        });
    }
}
