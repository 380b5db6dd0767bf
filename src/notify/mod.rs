//! Outbound notifications to the consuming application
//!
//! Every message the application can receive is a `Notification`. Sinks
//! decide where they go: an in-process broadcast hub (served over HTTP as
//! server-sent events) and, optionally, NATS.

pub mod messages;
pub mod nats;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::device::DetectedDevices;
use crate::recording::Record;
use crate::upload::TaskProgress;

pub use messages::PortMessage;
pub use nats::{NatsClient, NatsSink};

/// A message on one of the outbound ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "port", content = "data", rename_all = "camelCase")]
pub enum Notification {
    DetectDevicesResponse(DetectedDevices),
    DetectDevicesFinished,
    DeviceBound,
    BindingDeviceFailed,
    /// Microphone loudness, 0 to 100
    DeviceLevel(f32),
    RecordArrived(Record),
    TaskProgress(TaskProgress),
    UploadRecordFailed,
    PlayRecordFinished,
    /// Server push forwarded verbatim
    WebSocketMsg(serde_json::Value),
}

impl Notification {
    /// Name of the port the notification is sent on
    pub fn port(&self) -> &'static str {
        match self {
            Notification::DetectDevicesResponse(_) => "detectDevicesResponse",
            Notification::DetectDevicesFinished => "detectDevicesFinished",
            Notification::DeviceBound => "deviceBound",
            Notification::BindingDeviceFailed => "bindingDeviceFailed",
            Notification::DeviceLevel(_) => "deviceLevel",
            Notification::RecordArrived(_) => "recordArrived",
            Notification::TaskProgress(_) => "taskProgress",
            Notification::UploadRecordFailed => "uploadRecordFailed",
            Notification::PlayRecordFinished => "playRecordFinished",
            Notification::WebSocketMsg(_) => "webSocketMsg",
        }
    }
}

/// Destination for outbound notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// In-process fan-out of notifications
pub struct BroadcastHub {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastHub {
    fn notify(&self, notification: Notification) {
        debug!("Notify {}", notification.port());
        // No subscriber is not an error
        let _ = self.tx.send(notification);
    }
}

/// Sends every notification to several sinks
pub struct Fanout {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Fanout {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for Fanout {
    fn notify(&self, notification: Notification) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(notification.clone());
            }
            last.notify(notification);
        }
    }
}
