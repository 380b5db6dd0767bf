//! Realtime channel from the server
//!
//! Keeps a websocket open to the server, authenticates with the session
//! cookie and forwards every server push to the application as
//! `webSocketMsg`. Reconnects after a fixed delay until shut down.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::notify::{Notification, NotificationSink};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

pub struct RealtimeClient {
    status: Arc<RwLock<ConnectionStatus>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl RealtimeClient {
    /// Start the connection loop in the background
    pub fn spawn(url: String, cookie: Option<String>, notifier: Arc<dyn NotificationSink>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let status = Arc::new(RwLock::new(ConnectionStatus::Connecting));

        let status_clone = status.clone();
        tokio::spawn(async move {
            connection_loop(url, cookie, notifier, shutdown_rx, status_clone).await;
        });

        Self {
            status,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

async fn connection_loop(
    url: String,
    cookie: Option<String>,
    notifier: Arc<dyn NotificationSink>,
    mut shutdown_rx: mpsc::Receiver<()>,
    status: Arc<RwLock<ConnectionStatus>>,
) {
    let mut attempt = 0u32;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("Realtime shutdown requested");
            *status.write().await = ConnectionStatus::Disconnected;
            return;
        }

        *status.write().await = if attempt > 0 {
            ConnectionStatus::Reconnecting { attempt }
        } else {
            ConnectionStatus::Connecting
        };

        info!("Connecting to realtime channel: {}", url);

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Realtime channel connected");
                attempt = 0;
                *status.write().await = ConnectionStatus::Connected;

                let (mut write, mut read) = ws_stream.split();

                // The server identifies the session from the first frame
                if let Some(cookie) = &cookie {
                    if let Err(e) = write.send(Message::Text(cookie.clone())).await {
                        error!("Failed to send session cookie: {}", e);
                    }
                }

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => forward(&notifier, &text),
                                Some(Ok(Message::Ping(data))) => {
                                    if let Err(e) = write.send(Message::Pong(data)).await {
                                        warn!("Failed to send pong: {}", e);
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    info!("Server closed realtime channel");
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("Realtime channel error: {}", e);
                                    break;
                                }
                                None => {
                                    info!("Realtime stream ended");
                                    break;
                                }
                                _ => {}
                            }
                        }

                        _ = shutdown_rx.recv() => {
                            info!("Shutdown received during realtime connection");
                            let _ = write.send(Message::Close(None)).await;
                            *status.write().await = ConnectionStatus::Disconnected;
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to connect realtime channel: {}", e);
            }
        }

        *status.write().await = ConnectionStatus::Disconnected;
        attempt += 1;
        info!("Reconnecting in {:?} (attempt {})", RECONNECT_DELAY, attempt);

        tokio::select! {
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown_rx.recv() => {
                info!("Shutdown during reconnect delay");
                return;
            }
        }
    }
}

fn forward(notifier: &Arc<dyn NotificationSink>, text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => {
            debug!("Realtime message received");
            notifier.notify(Notification::WebSocketMsg(value));
        }
        Err(e) => warn!("Dropping non-JSON realtime message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BroadcastHub;
    use serde_json::json;

    #[tokio::test]
    async fn test_forward_only_json() {
        let hub = Arc::new(BroadcastHub::default());
        let mut rx = hub.subscribe();
        let notifier: Arc<dyn NotificationSink> = hub.clone();

        forward(&notifier, "not json");
        forward(&notifier, r#"{"type":"capsule_changed","id":"c1"}"#);

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            Notification::WebSocketMsg(json!({ "type": "capsule_changed", "id": "c1" }))
        );
        assert!(rx.try_recv().is_err());
    }
}
