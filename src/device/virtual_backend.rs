// Virtual capture backend driven by configuration
//
// Lets the service run, and be exercised end to end, on machines without
// cameras. Each configured device advertises the resolutions it can open;
// acquisitions outside them fail the same way a real device would.

use parking_lot::RwLock;
use serde::Deserialize;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{
    AudioFrame, CaptureBackend, DeviceInfo, MediaConstraints, MediaKind, MediaRecorder, MediaStream,
    RecorderOptions, TrackConstraint,
};
use super::Resolution;
use crate::controller::OverlaySource;
use crate::error::{CaptureError, CaptureResult};
use crate::recording::{ChunkSink, LocalBlob};

const TONE_SAMPLE_RATE: u32 = 16000;
const TONE_FRAME_MS: u64 = 100;
const DEFAULT_MIME: &str = "video/webm";

/// One simulated input device
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualDeviceConfig {
    pub device_id: String,
    pub label: String,
    #[serde(default)]
    pub group_id: String,
    pub kind: MediaKind,
    /// Resolutions the camera accepts; ignored for microphones
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
    /// Simulate the user refusing access to this device
    #[serde(default)]
    pub denied: bool,
}

/// Capture backend over a configurable set of simulated devices
pub struct VirtualBackend {
    devices: RwLock<Vec<VirtualDeviceConfig>>,
    changes: broadcast::Sender<()>,
    open_streams: Arc<AtomicUsize>,
}

impl VirtualBackend {
    pub fn new(devices: Vec<VirtualDeviceConfig>) -> Self {
        info!("Virtual backend initialized with {} devices", devices.len());

        let (changes, _) = broadcast::channel(16);
        Self {
            devices: RwLock::new(devices),
            changes,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulate plugging a device in
    pub fn plug(&self, device: VirtualDeviceConfig) {
        info!("Device plugged: {}", device.label);
        self.devices.write().push(device);
        let _ = self.changes.send(());
    }

    /// Simulate unplugging a device
    pub fn unplug(&self, device_id: &str) {
        info!("Device unplugged: {}", device_id);
        self.devices.write().retain(|d| d.device_id != device_id);
        let _ = self.changes.send(());
    }

    /// Number of streams currently open
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn resolve(&self, kind: MediaKind, constraint: &TrackConstraint) -> CaptureResult<Option<String>> {
        if !constraint.is_requested() {
            return Ok(None);
        }

        let devices = self.devices.read();
        let device = match constraint.device_id() {
            Some(id) => devices.iter().find(|d| d.kind == kind && d.device_id == id),
            None => devices.iter().find(|d| d.kind == kind),
        };

        let Some(device) = device else {
            return Err(CaptureError::Overconstrained {
                constraint: format!("{} deviceId {:?}", kind, constraint.device_id()),
            });
        };

        if device.denied {
            return Err(CaptureError::PermissionDenied { kind });
        }

        if let Some(resolution) = constraint.resolution() {
            if kind == MediaKind::Video && !device.resolutions.contains(&resolution) {
                return Err(CaptureError::Overconstrained {
                    constraint: format!("{} at {}", device.label, resolution),
                });
            }
        }

        Ok(Some(device.device_id.clone()))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for VirtualBackend {
    async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .read()
            .iter()
            .map(|d| DeviceInfo {
                device_id: d.device_id.clone(),
                group_id: d.group_id.clone(),
                label: d.label.clone(),
                kind: d.kind,
            })
            .collect())
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        let video = self.resolve(MediaKind::Video, &constraints.video)?;
        let audio = self.resolve(MediaKind::Audio, &constraints.audio)?;

        if video.is_none() && audio.is_none() {
            return Err(CaptureError::Overconstrained {
                constraint: "no track requested".to_string(),
            });
        }

        let stream = VirtualStream::open(video, audio, Arc::clone(&self.open_streams));
        debug!("Opened virtual stream {}", stream.id);

        Ok(Box::new(stream))
    }

    fn device_changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

/// Stream over simulated devices; the microphone emits a steady tone
pub struct VirtualStream {
    id: String,
    video: Option<String>,
    audio: Option<String>,
    frames: broadcast::Sender<AudioFrame>,
    tone_task: Option<JoinHandle<()>>,
    open_streams: Arc<AtomicUsize>,
    live: bool,
}

impl VirtualStream {
    fn open(video: Option<String>, audio: Option<String>, open_streams: Arc<AtomicUsize>) -> Self {
        let (frames, _) = broadcast::channel(32);

        let tone_task = audio.as_ref().map(|_| {
            let frames = frames.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(TONE_FRAME_MS));
                let mut timestamp_ms = 0;
                loop {
                    interval.tick().await;
                    let _ = frames.send(tone_frame(timestamp_ms));
                    timestamp_ms += TONE_FRAME_MS;
                }
            })
        });

        open_streams.fetch_add(1, Ordering::SeqCst);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            video,
            audio,
            frames,
            tone_task,
            open_streams,
            live: true,
        }
    }
}

impl MediaStream for VirtualStream {
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
        self.audio.as_ref().map(|_| self.frames.subscribe())
    }

    fn recorder(&self, options: &RecorderOptions, sink: ChunkSink) -> CaptureResult<Box<dyn MediaRecorder>> {
        if !self.live {
            return Err(CaptureError::Recorder("stream is stopped".to_string()));
        }
        Ok(Box::new(VirtualRecorder::new(self.id.clone(), options, sink)))
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        if let Some(task) = self.tone_task.take() {
            task.abort();
        }
        self.live = false;
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
        debug!("Stopped virtual stream {}", self.id);
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Recorder whose "encoding" is a small JSON description of the take
pub struct VirtualRecorder {
    source: String,
    mime: String,
    sink: ChunkSink,
    started_at: Option<Instant>,
}

impl VirtualRecorder {
    fn new(source: String, options: &RecorderOptions, sink: ChunkSink) -> Self {
        Self {
            source,
            mime: options.mime_type.clone().unwrap_or_else(|| DEFAULT_MIME.to_string()),
            sink,
            started_at: None,
        }
    }
}

impl MediaRecorder for VirtualRecorder {
    fn start(&mut self) -> CaptureResult<()> {
        if self.started_at.is_some() {
            return Err(CaptureError::Recorder("already recording".to_string()));
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> CaptureResult<()> {
        let Some(started_at) = self.started_at.take() else {
            return Ok(());
        };

        let take = serde_json::json!({
            "source": self.source,
            "duration_ms": started_at.elapsed().as_millis() as u64,
        });
        self.sink
            .deliver(LocalBlob::new(self.mime.clone(), serde_json::to_vec(&take)?));

        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Pointer canvas stand-in for premium overlay recording
#[derive(Debug, Default)]
pub struct VirtualOverlay;

impl OverlaySource for VirtualOverlay {
    fn recorder(&self, options: &RecorderOptions, sink: ChunkSink) -> CaptureResult<Box<dyn MediaRecorder>> {
        Ok(Box::new(VirtualRecorder::new("pointer-canvas".to_string(), options, sink)))
    }
}

fn tone_frame(timestamp_ms: u64) -> AudioFrame {
    let len = (TONE_SAMPLE_RATE as u64 * TONE_FRAME_MS / 1000) as usize;
    let samples = (0..len)
        .map(|i| {
            let phase = 2.0 * PI * 440.0 * i as f32 / TONE_SAMPLE_RATE as f32;
            (phase.sin() * 0.25 * i16::MAX as f32) as i16
        })
        .collect();

    AudioFrame {
        samples,
        sample_rate: TONE_SAMPLE_RATE,
        channels: 1,
        timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RecordedChunk, Track};
    use tokio::sync::mpsc;

    fn camera() -> VirtualDeviceConfig {
        VirtualDeviceConfig {
            device_id: "cam1".to_string(),
            label: "Front camera".to_string(),
            group_id: "g1".to_string(),
            kind: MediaKind::Video,
            resolutions: vec![Resolution::new(1280, 720), Resolution::new(640, 480)],
            denied: false,
        }
    }

    fn microphone() -> VirtualDeviceConfig {
        VirtualDeviceConfig {
            device_id: "mic1".to_string(),
            label: "Built-in microphone".to_string(),
            group_id: "g1".to_string(),
            kind: MediaKind::Audio,
            resolutions: Vec::new(),
            denied: false,
        }
    }

    #[tokio::test]
    async fn test_exact_resolution_must_be_supported() {
        let backend = VirtualBackend::new(vec![camera()]);

        let ok = backend
            .acquire(&MediaConstraints::exact_video("cam1", Resolution::new(640, 480)))
            .await;
        assert!(ok.is_ok());

        let err = backend
            .acquire(&MediaConstraints::exact_video("cam1", Resolution::new(1920, 1080)))
            .await;
        assert!(matches!(err, Err(CaptureError::Overconstrained { .. })));
    }

    #[tokio::test]
    async fn test_denied_device_reports_its_kind() {
        let mut mic = microphone();
        mic.denied = true;
        let backend = VirtualBackend::new(vec![camera(), mic]);

        let constraints = MediaConstraints {
            audio: TrackConstraint::Enabled(true),
            video: TrackConstraint::Enabled(true),
        };
        let err = backend.acquire(&constraints).await;
        assert!(matches!(
            err,
            Err(CaptureError::PermissionDenied { kind: MediaKind::Audio })
        ));
    }

    #[tokio::test]
    async fn test_open_stream_count_follows_stop() {
        let backend = VirtualBackend::new(vec![camera(), microphone()]);
        let constraints = MediaConstraints {
            audio: TrackConstraint::Enabled(true),
            video: TrackConstraint::device("cam1"),
        };

        let mut stream = backend.acquire(&constraints).await.unwrap();
        assert_eq!(backend.open_streams(), 1);
        assert_eq!(stream.device_id(MediaKind::Audio).as_deref(), Some("mic1"));

        stream.stop();
        stream.stop();
        assert_eq!(backend.open_streams(), 0);
        assert!(!stream.is_live());
    }

    #[tokio::test]
    async fn test_recorder_delivers_chunk_on_stop() {
        let backend = VirtualBackend::new(vec![camera()]);
        let stream = backend
            .acquire(&MediaConstraints {
                audio: TrackConstraint::Enabled(false),
                video: TrackConstraint::Enabled(true),
            })
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<RecordedChunk>();
        let mut recorder = stream
            .recorder(&RecorderOptions::default(), ChunkSink::new(Track::Primary, tx))
            .unwrap();

        recorder.start().unwrap();
        assert!(recorder.is_recording());
        recorder.stop().unwrap();

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.track, Track::Primary);
        assert_eq!(chunk.blob.mime, DEFAULT_MIME);
    }

    #[tokio::test]
    async fn test_plug_emits_device_change() {
        let backend = VirtualBackend::new(vec![camera()]);
        let mut changes = backend.device_changes().unwrap();

        backend.plug(microphone());
        assert!(changes.recv().await.is_ok());
        assert_eq!(backend.enumerate_devices().await.unwrap().len(), 2);
    }
}
