use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::acquire::StreamAcquirer;
use super::backend::{Device, DeviceInfo, MediaConstraints, MediaKind, Resolution, TrackConstraint};
use crate::error::{CaptureError, CaptureResult};
use crate::notify::{Notification, NotificationSink};
use crate::storage::ClientConfigStore;

/// Candidate resolutions tried on a new camera, largest first
pub const DEFAULT_CANDIDATES: [Resolution; 6] = [
    Resolution::new(1920, 1080),
    Resolution::new(1280, 720),
    Resolution::new(800, 600),
    Resolution::new(640, 480),
    Resolution::new(640, 360),
    Resolution::new(320, 240),
];

/// Probed devices grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub audio: Vec<Device>,
    #[serde(default)]
    pub video: Vec<Device>,
}

/// Devices granted by the permission probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredDevice {
    pub audio: Option<Device>,
    /// The camera with its preferred (largest) resolution
    pub video: Option<(Device, Option<Resolution>)>,
}

/// Result of one detection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDevices {
    pub devices: DeviceList,
    pub preferred_device: Option<PreferredDevice>,
}

/// Parameters of a detection request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectRequest {
    /// Ignore cached resolutions and probe every camera again
    pub force_refresh: bool,
    /// Camera to grant and probe even if it is cached
    pub pinned_device_id: Option<String>,
    /// Asked for by the application, which expects `detectDevicesFinished`
    pub explicit: bool,
}

impl DetectRequest {
    pub fn explicit(force_refresh: bool, pinned_device_id: Option<String>) -> Self {
        Self {
            force_refresh,
            pinned_device_id,
            explicit: true,
        }
    }

    /// Re-run triggered by a device change or a coalesced request
    pub fn device_change() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct ProbeFlags {
    detecting: bool,
    redetect_requested: bool,
}

/// Enumerates devices and finds out which resolutions each camera can open
pub struct DeviceProber {
    acquirer: Arc<StreamAcquirer>,
    store: Arc<ClientConfigStore>,
    notifier: Arc<dyn NotificationSink>,
    candidates: Vec<Resolution>,
    flags: Mutex<ProbeFlags>,
}

impl DeviceProber {
    pub fn new(
        acquirer: Arc<StreamAcquirer>,
        store: Arc<ClientConfigStore>,
        notifier: Arc<dyn NotificationSink>,
        candidates: Vec<Resolution>,
    ) -> Self {
        Self {
            acquirer,
            store,
            notifier,
            candidates,
            flags: Mutex::new(ProbeFlags::default()),
        }
    }

    pub fn candidates(&self) -> &[Resolution] {
        &self.candidates
    }

    /// Run a detection pass
    ///
    /// Returns `None` when a pass is already running: the request is folded
    /// into a single trailing re-run of that pass.
    pub async fn detect(&self, request: DetectRequest) -> CaptureResult<Option<DetectedDevices>> {
        {
            let mut flags = self.flags.lock();
            if flags.detecting {
                debug!("Detection already running, scheduling a re-run");
                flags.redetect_requested = true;
                return Ok(None);
            }
            flags.detecting = true;
        }

        let mut request = request;
        let mut last = None;

        loop {
            let result = self.run_pass(&request).await;

            let rerun = {
                let mut flags = self.flags.lock();
                if flags.redetect_requested {
                    flags.redetect_requested = false;
                    true
                } else {
                    flags.detecting = false;
                    false
                }
            };

            match result {
                Ok(detected) => last = Some(detected),
                Err(e) if rerun => warn!("Detection pass failed, re-running: {}", e),
                Err(e) => return Err(e),
            }

            if !rerun {
                break;
            }

            info!("Re-running device detection");
            request = DetectRequest::device_change();
        }

        Ok(last)
    }

    async fn run_pass(&self, request: &DetectRequest) -> CaptureResult<DetectedDevices> {
        info!("Detecting devices");

        let cached = self.store.cached_devices()?;
        let has_preferred = self.store.preferred_device()?.is_some();

        let mut devices = self.acquirer.enumerate_devices().await?;
        let mut denied = HashSet::new();
        let mut granted = None;

        if !has_preferred || request.pinned_device_id.is_some() {
            // Without a granted stream labels are blank, so ask for one
            let has_video = devices.iter().any(|d| d.kind == MediaKind::Video);
            let constraints = MediaConstraints {
                audio: TrackConstraint::Enabled(request.pinned_device_id.is_none()),
                video: match &request.pinned_device_id {
                    Some(id) => TrackConstraint::device(id.clone()),
                    None => TrackConstraint::Enabled(has_video),
                },
            };

            match self.acquirer.acquire(&constraints).await {
                Ok(mut stream) => {
                    granted = Some((
                        stream.device_id(MediaKind::Audio),
                        stream.device_id(MediaKind::Video),
                    ));
                    stream.stop();
                    devices = self.acquirer.enumerate_devices().await?;
                }
                Err(CaptureError::PermissionDenied { kind }) => {
                    warn!("Permission denied for {} devices", kind);
                    denied.insert(kind);
                }
                Err(e) => warn!("Permission probe failed: {}", e),
            }
        }

        let mut report = DeviceList::default();

        for info in devices {
            if denied.contains(&info.kind) {
                continue;
            }

            match info.kind {
                MediaKind::Video => {
                    let device = self.describe_camera(info, &cached, request).await;
                    report.video.push(device);
                }
                MediaKind::Audio => {
                    debug!("Found microphone {}", info.label);
                    report.audio.push(Device::from_info(info, Vec::new()));
                }
            }
        }

        info!(
            "Detection finished: {} microphones, {} cameras",
            report.audio.len(),
            report.video.len()
        );

        let pinned = request.pinned_device_id.is_some();
        let preferred_device = granted.and_then(|(audio_id, video_id)| {
            // A grant without a camera only counts when a camera was pinned
            if video_id.is_none() && !pinned {
                return None;
            }

            let audio = audio_id.and_then(|id| report.audio.iter().find(|d| d.device_id == id).cloned());
            let video = video_id.and_then(|id| {
                report
                    .video
                    .iter()
                    .find(|d| d.device_id == id)
                    .map(|d| (d.clone(), d.resolutions.first().copied()))
            });

            Some(PreferredDevice { audio, video })
        });

        // A denial hides devices from this report but does not invalidate their cache
        let mut persisted = report.clone();
        if denied.contains(&MediaKind::Video) {
            persisted.video = cached.video.clone();
        }
        if denied.contains(&MediaKind::Audio) {
            persisted.audio = cached.audio.clone();
        }
        self.store.store_devices(&persisted)?;

        let detected = DetectedDevices {
            devices: report,
            preferred_device,
        };

        self.notifier
            .notify(Notification::DetectDevicesResponse(detected.clone()));

        if request.explicit {
            self.notifier.notify(Notification::DetectDevicesFinished);
        }

        Ok(detected)
    }

    async fn describe_camera(&self, info: DeviceInfo, cached: &DeviceList, request: &DetectRequest) -> Device {
        let pinned = request.pinned_device_id.as_deref() == Some(info.device_id.as_str());

        if !request.force_refresh && !pinned {
            let hit = cached
                .video
                .iter()
                .find(|d| d.device_id == info.device_id && !d.resolutions.is_empty());

            if let Some(hit) = hit {
                debug!("Using cached resolutions for camera {}", info.label);
                let mut device = hit.clone();
                device.label = info.label;
                return device;
            }
        }

        info!("Probing resolutions for camera {}", info.label);
        let resolutions = self.probe_resolutions(&info.device_id).await;
        Device::from_info(info, resolutions)
    }

    /// Try each candidate in order; keep exactly the ones that open
    async fn probe_resolutions(&self, device_id: &str) -> Vec<Resolution> {
        let mut supported = Vec::new();

        for &resolution in &self.candidates {
            let constraints = MediaConstraints::exact_video(device_id, resolution);

            match self.acquirer.acquire(&constraints).await {
                Ok(mut stream) => {
                    stream.stop();
                    debug!("Resolution {} is working", resolution);
                    supported.push(resolution);
                }
                Err(e) => debug!("Resolution {} is not working: {}", resolution, e),
            }
        }

        supported
    }
}
