pub mod acquire;
pub mod backend;
pub mod probe;
pub mod virtual_backend;

pub use acquire::StreamAcquirer;
pub use backend::{
    AudioFrame, BindingSettings, CaptureBackend, Device, DeviceInfo, ExactConstraint, MediaConstraints,
    MediaKind, MediaRecorder, MediaStream, RecorderOptions, Resolution, TrackConstraint,
};
pub use probe::{DetectRequest, DetectedDevices, DeviceList, DeviceProber, PreferredDevice, DEFAULT_CANDIDATES};
pub use virtual_backend::{VirtualBackend, VirtualDeviceConfig, VirtualOverlay};
