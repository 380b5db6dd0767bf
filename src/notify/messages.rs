use serde::{Deserialize, Serialize};

use super::Notification;

/// Envelope published to NATS for each notification
#[derive(Debug, Serialize, Deserialize)]
pub struct PortMessage {
    pub client_id: String,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub notification: Notification,
}

impl PortMessage {
    pub fn new(client_id: &str, notification: Notification) -> Self {
        Self {
            client_id: client_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            notification,
        }
    }
}
