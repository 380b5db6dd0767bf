pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod http;
pub mod notify;
pub mod ports;
pub mod realtime;
pub mod recording;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use controller::{BindOutcome, BindState, DeviceController, UnbindOutcome};
pub use device::{
    BindingSettings, CaptureBackend, DetectRequest, DetectedDevices, DeviceProber, MediaConstraints,
    StreamAcquirer, VirtualBackend,
};
pub use error::{CaptureError, CaptureResult};
pub use http::{create_router, AppState};
pub use notify::{BroadcastHub, Notification, NotificationSink};
pub use ports::{Ports, PortsParts};
pub use realtime::RealtimeClient;
pub use recording::{Record, RecordEvent};
pub use storage::ClientConfigStore;
pub use upload::{RecordUploader, TaskProgress};
