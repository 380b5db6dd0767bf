use crate::notify::BroadcastHub;
use crate::ports::Ports;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ports: Arc<Ports>,
    /// Source of the `/events` stream
    pub hub: Arc<BroadcastHub>,
    /// Stamped on every streamed notification
    pub client_id: String,
}

impl AppState {
    pub fn new(ports: Arc<Ports>, hub: Arc<BroadcastHub>, client_id: String) -> Self {
        Self { ports, hub, client_id }
    }
}
