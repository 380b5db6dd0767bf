// Shared test doubles for the integration tests
#![allow(dead_code)]

use capsule_capture::device::{
    AudioFrame, BindingSettings, CaptureBackend, DeviceInfo, MediaConstraints, MediaKind, MediaRecorder,
    MediaStream, RecorderOptions, Resolution, TrackConstraint,
};
use capsule_capture::error::{CaptureError, CaptureResult};
use capsule_capture::notify::{Notification, NotificationSink};
use capsule_capture::recording::{ChunkSink, LocalBlob};
use capsule_capture::upload::{ProgressFn, UploadTransport};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

/// Capture backend that records every acquisition and can hold them at a gate
pub struct MockBackend {
    devices: Mutex<Vec<DeviceInfo>>,
    accepts: Mutex<HashMap<String, Vec<Resolution>>>,
    denied: Mutex<HashSet<MediaKind>>,
    broken: Mutex<HashSet<String>>,
    acquisitions: Mutex<Vec<MediaConstraints>>,
    gate: Semaphore,
    open: Arc<AtomicUsize>,
    changes: broadcast::Sender<()>,
}

impl MockBackend {
    /// Acquisitions complete immediately
    pub fn open() -> Self {
        Self::with_gate(Semaphore::MAX_PERMITS)
    }

    /// Acquisitions block until `open_gate` is called
    pub fn gated() -> Self {
        Self::with_gate(0)
    }

    fn with_gate(permits: usize) -> Self {
        let (changes, _) = broadcast::channel(4);
        Self {
            devices: Mutex::new(Vec::new()),
            accepts: Mutex::new(HashMap::new()),
            denied: Mutex::new(HashSet::new()),
            broken: Mutex::new(HashSet::new()),
            acquisitions: Mutex::new(Vec::new()),
            gate: Semaphore::new(permits),
            open: Arc::new(AtomicUsize::new(0)),
            changes,
        }
    }

    pub fn with_camera(self, id: &str, resolutions: &[Resolution]) -> Self {
        self.devices.lock().push(device_info(id, MediaKind::Video));
        self.accepts.lock().insert(id.to_string(), resolutions.to_vec());
        self
    }

    pub fn with_microphone(self, id: &str) -> Self {
        self.devices.lock().push(device_info(id, MediaKind::Audio));
        self
    }

    /// Every acquisition of this camera fails
    pub fn with_broken_camera(self, id: &str) -> Self {
        let backend = self.with_camera(id, &[]);
        backend.broken.lock().insert(id.to_string());
        backend
    }

    pub fn deny(&self, kind: MediaKind) {
        self.denied.lock().insert(kind);
    }

    pub fn allow(&self, kind: MediaKind) {
        self.denied.lock().remove(&kind);
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(1);
    }

    pub fn acquisitions(&self) -> Vec<MediaConstraints> {
        self.acquisitions.lock().clone()
    }

    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.lock().len()
    }

    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn resolve(&self, kind: MediaKind, constraint: &TrackConstraint) -> CaptureResult<Option<String>> {
        if !constraint.is_requested() {
            return Ok(None);
        }

        if self.denied.lock().contains(&kind) {
            return Err(CaptureError::PermissionDenied { kind });
        }

        let devices = self.devices.lock();
        let device = devices
            .iter()
            .filter(|d| d.kind == kind)
            .find(|d| constraint.device_id().map_or(true, |id| id == d.device_id))
            .ok_or_else(|| CaptureError::Overconstrained {
                constraint: format!("{} device", kind),
            })?;

        if self.broken.lock().contains(&device.device_id) {
            return Err(CaptureError::Overconstrained {
                constraint: format!("{} is broken", device.device_id),
            });
        }

        if let Some(resolution) = constraint.resolution() {
            let accepts = self.accepts.lock();
            let ok = accepts
                .get(&device.device_id)
                .is_some_and(|r| r.contains(&resolution));
            if !ok {
                return Err(CaptureError::Overconstrained {
                    constraint: resolution.to_string(),
                });
            }
        }

        Ok(Some(device.device_id.clone()))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MockBackend {
    async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(self.devices.lock().clone())
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        self.acquisitions.lock().push(constraints.clone());

        let permit = self.gate.acquire().await.map_err(|e| CaptureError::Recorder(e.to_string()))?;
        drop(permit);

        let audio = self.resolve(MediaKind::Audio, &constraints.audio)?;
        let video = self.resolve(MediaKind::Video, &constraints.video)?;

        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            id: uuid::Uuid::new_v4().to_string(),
            audio,
            video,
            open: Arc::clone(&self.open),
            live: true,
        }))
    }

    fn device_changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockStream {
    id: String,
    audio: Option<String>,
    video: Option<String>,
    open: Arc<AtomicUsize>,
    live: bool,
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self, kind: MediaKind) -> Option<String> {
        match kind {
            MediaKind::Audio => self.audio.clone(),
            MediaKind::Video => self.video.clone(),
        }
    }

    fn audio_frames(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        None
    }

    fn recorder(&self, options: &RecorderOptions, sink: ChunkSink) -> CaptureResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(MockRecorder {
            mime: options.mime_type.clone().unwrap_or_else(|| "video/webm".to_string()),
            payload: self.id.clone(),
            sink,
            recording: false,
        }))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct MockRecorder {
    mime: String,
    payload: String,
    sink: ChunkSink,
    recording: bool,
}

impl MediaRecorder for MockRecorder {
    fn start(&mut self) -> CaptureResult<()> {
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> CaptureResult<()> {
        if self.recording {
            self.recording = false;
            self.sink
                .deliver(LocalBlob::new(self.mime.clone(), self.payload.clone().into_bytes()));
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Notification sink that keeps everything it receives
#[derive(Default)]
pub struct CollectingSink {
    notifications: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn count(&self, port: &str) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.port() == port)
            .count()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

/// Upload transport that replies with a fixed capsule
pub struct MockTransport {
    reply: Value,
    fail: bool,
    gate: Semaphore,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn replying(reply: Value) -> Self {
        Self {
            reply,
            fail: false,
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying(Value::Null)
        }
    }

    /// Transfers hang after reporting half progress
    pub fn hanging(reply: Value) -> Self {
        Self {
            gate: Semaphore::new(0),
            ..Self::replying(reply)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl UploadTransport for MockTransport {
    async fn post(&self, path: &str, _blob: LocalBlob, progress: ProgressFn) -> CaptureResult<Value> {
        self.calls.lock().push(path.to_string());

        progress(0.5);
        let permit = self.gate.acquire().await.map_err(|e| CaptureError::Network(e.to_string()))?;
        drop(permit);

        if self.fail {
            return Err(CaptureError::Network("connection reset".to_string()));
        }

        progress(1.0);
        Ok(self.reply.clone())
    }
}

pub fn device_info(id: &str, kind: MediaKind) -> DeviceInfo {
    DeviceInfo {
        device_id: id.to_string(),
        group_id: "group".to_string(),
        label: format!("{} {}", kind, id),
        kind,
    }
}

/// Settings binding the microphone and a camera at 640x480
pub fn settings(camera: &str) -> BindingSettings {
    BindingSettings {
        device: MediaConstraints {
            audio: TrackConstraint::Enabled(true),
            video: MediaConstraints::exact_video(camera, Resolution::new(640, 480)).video,
        },
        recording: RecorderOptions::default(),
    }
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Yield until `condition` holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}
