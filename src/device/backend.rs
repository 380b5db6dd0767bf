use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::error::CaptureResult;
use crate::recording::ChunkSink;

/// Kind of capture input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Video frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A device as reported by enumeration, before any probing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub group_id: String,
    /// Empty until permission has been granted at least once
    pub label: String,
    pub kind: MediaKind,
}

/// Device descriptor with its probed capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub group_id: String,
    pub label: String,
    pub kind: MediaKind,
    /// Supported resolutions, largest first. Always empty for audio devices.
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Device {
    pub fn from_info(info: DeviceInfo, resolutions: Vec<Resolution>) -> Self {
        Self {
            device_id: info.device_id,
            group_id: info.group_id,
            label: info.label,
            kind: info.kind,
            resolutions,
            available: true,
        }
    }
}

/// Constraint on a single track of a capture request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackConstraint {
    /// `true` picks any device of the kind, `false` omits the track
    Enabled(bool),
    Exact(ExactConstraint),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl TrackConstraint {
    pub fn device(device_id: impl Into<String>) -> Self {
        TrackConstraint::Exact(ExactConstraint {
            device_id: Some(device_id.into()),
            ..Default::default()
        })
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, TrackConstraint::Enabled(false))
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            TrackConstraint::Exact(exact) => exact.device_id.as_deref(),
            TrackConstraint::Enabled(_) => None,
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            TrackConstraint::Exact(ExactConstraint {
                width: Some(width),
                height: Some(height),
                ..
            }) => Some(Resolution::new(*width, *height)),
            _ => None,
        }
    }
}

impl Default for TrackConstraint {
    fn default() -> Self {
        TrackConstraint::Enabled(false)
    }
}

/// Audio and video constraints for one acquisition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    #[serde(default)]
    pub audio: TrackConstraint,
    #[serde(default)]
    pub video: TrackConstraint,
}

impl MediaConstraints {
    /// Video-only request for one device at one exact resolution
    pub fn exact_video(device_id: &str, resolution: Resolution) -> Self {
        Self {
            audio: TrackConstraint::Enabled(false),
            video: TrackConstraint::Exact(ExactConstraint {
                device_id: Some(device_id.to_string()),
                width: Some(resolution.width),
                height: Some(resolution.height),
            }),
        }
    }

    pub fn track(&self, kind: MediaKind) -> &TrackConstraint {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

/// Encoder options handed to the recorder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bits_per_second: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bits_per_second: Option<u32>,
}

/// Everything needed to bind a device: what to capture and how to encode it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSettings {
    pub device: MediaConstraints,
    #[serde(default)]
    pub recording: RecorderOptions,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream opened
    pub timestamp_ms: u64,
}

/// Capture backend trait
///
/// Implementations wrap a platform's device layer. The crate ships a
/// configurable virtual backend; hardware backends plug in the same way.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// List the audio and video inputs currently present
    async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>>;

    /// Open a stream satisfying `constraints`
    ///
    /// Fails with `PermissionDenied` or `Overconstrained`.
    async fn acquire(&self, constraints: &MediaConstraints) -> CaptureResult<Box<dyn MediaStream>>;

    /// Feed of device plug/unplug notifications, if the platform has one
    fn device_changes(&self) -> Option<broadcast::Receiver<()>>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// A live capture stream
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    /// Id of the device feeding the track of `kind`, if that track exists
    fn device_id(&self, kind: MediaKind) -> Option<String>;

    /// Subscribe to the microphone samples, if the stream has an audio track
    fn audio_frames(&self) -> Option<broadcast::Receiver<AudioFrame>>;

    /// Create an encoder bound to this stream; chunks go to `sink`
    fn recorder(
        &self,
        options: &RecorderOptions,
        sink: ChunkSink,
    ) -> CaptureResult<Box<dyn MediaRecorder>>;

    /// Stop every track. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Encoder attached to a stream
///
/// `stop` is synchronous; the encoded chunk is delivered later to the
/// `ChunkSink` the recorder was created with.
pub trait MediaRecorder: Send + Sync {
    fn start(&mut self) -> CaptureResult<()>;

    fn stop(&mut self) -> CaptureResult<()>;

    fn is_recording(&self) -> bool;
}
