//! Wiring of the capture components
//!
//! `Ports` owns one instance of every collaborator and is what the HTTP
//! control API and the CLI drive.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::controller::{ControllerOptions, DeviceController, NullPreview, OverlaySource, PreviewSink};
use crate::device::{CaptureBackend, DetectRequest, DeviceProber, Resolution, StreamAcquirer, VirtualBackend, VirtualOverlay};
use crate::notify::NotificationSink;
use crate::storage::ClientConfigStore;
use crate::upload::{HttpTransport, RecordUploader, TaskTracker, UploadTransport};

/// Collaborators a `Ports` instance is built from
pub struct PortsParts {
    pub backend: Arc<dyn CaptureBackend>,
    pub store: Arc<ClientConfigStore>,
    pub transport: Arc<dyn UploadTransport>,
    pub preview: Arc<dyn PreviewSink>,
    pub overlay: Option<Arc<dyn OverlaySource>>,
    pub notifier: Arc<dyn NotificationSink>,
    pub premium: bool,
    pub candidates: Vec<Resolution>,
}

pub struct Ports {
    pub acquirer: Arc<StreamAcquirer>,
    pub prober: Arc<DeviceProber>,
    pub controller: Arc<DeviceController>,
    pub uploader: Arc<RecordUploader>,
    pub tracker: Arc<TaskTracker>,
    pub store: Arc<ClientConfigStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Ports {
    /// Must be called from within a Tokio runtime
    pub fn new(parts: PortsParts) -> Self {
        let acquirer = Arc::new(StreamAcquirer::new(parts.backend));

        let prober = Arc::new(DeviceProber::new(
            Arc::clone(&acquirer),
            Arc::clone(&parts.store),
            Arc::clone(&parts.notifier),
            parts.candidates,
        ));

        let controller = Arc::new(DeviceController::new(
            Arc::clone(&acquirer),
            parts.preview,
            parts.overlay,
            Arc::clone(&parts.notifier),
            ControllerOptions {
                premium: parts.premium,
            },
        ));

        let tracker = Arc::new(TaskTracker::new(Arc::clone(&parts.notifier)));
        let uploader = Arc::new(RecordUploader::new(
            parts.transport,
            Arc::clone(&tracker),
            Arc::clone(&parts.notifier),
        ));

        Self {
            acquirer,
            prober,
            controller,
            uploader,
            tracker,
            store: parts.store,
            notifier: parts.notifier,
        }
    }

    /// Build from configuration over the virtual backend
    pub fn from_config(config: &Config, notifier: Arc<dyn NotificationSink>) -> Result<Self> {
        let path = config.storage.client_config_path();
        let store = ClientConfigStore::open(&path)
            .with_context(|| format!("Failed to open client config at {}", path.display()))?;

        let overlay: Option<Arc<dyn OverlaySource>> = if config.account.premium {
            Some(Arc::new(VirtualOverlay))
        } else {
            None
        };

        Ok(Self::new(PortsParts {
            backend: Arc::new(VirtualBackend::new(config.devices.clone())),
            store: Arc::new(store),
            transport: Arc::new(HttpTransport::new(
                config.server.base_url.clone(),
                config.server.cookie.clone(),
            )),
            preview: Arc::new(NullPreview),
            overlay,
            notifier,
            premium: config.account.premium,
            candidates: config.probe.resolutions.clone(),
        }))
    }

    /// Re-run detection whenever the device-change hook fires
    pub fn spawn_device_watch(&self) -> JoinHandle<()> {
        let changed = self.acquirer.device_changed();
        let prober = Arc::clone(&self.prober);

        tokio::spawn(async move {
            info!("Watching for device changes");
            loop {
                changed.notified().await;
                if let Err(e) = prober.detect(DetectRequest::device_change()).await {
                    error!("Device re-detection failed: {}", e);
                }
            }
        })
    }

    /// Cancel a running upload by tracker id
    pub fn abort_task(&self, tracker: &str) -> bool {
        self.tracker.abort(tracker)
    }
}
