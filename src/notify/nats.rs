use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::messages::PortMessage;
use super::{Notification, NotificationSink};

pub struct NatsClient {
    client: Client,
    client_id: String,
    subject_prefix: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, client_id: String, subject_prefix: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            client_id,
            subject_prefix,
        })
    }

    /// Subject a notification is published on, e.g. `ports.deviceBound`
    pub fn subject_for(&self, notification: &Notification) -> String {
        format!("{}.{}", self.subject_prefix, notification.port())
    }

    /// Publish one notification
    pub async fn publish(&self, notification: Notification) -> Result<()> {
        let subject = self.subject_for(&notification);
        let message = PortMessage::new(&self.client_id, notification);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish notification")?;

        debug!("Published notification to {}", subject);

        Ok(())
    }
}

/// Notification sink that publishes to NATS from a background task
pub struct NatsSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NatsSink {
    pub fn spawn(client: NatsClient) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        tokio::spawn(async move {
            info!("NATS publisher task started");

            while let Some(notification) = rx.recv().await {
                // Keep publishing even if one message fails
                if let Err(e) = client.publish(notification).await {
                    error!("Failed to publish notification to NATS: {}", e);
                }
            }

            info!("NATS publisher task stopped");
        });

        Self { tx }
    }
}

impl NotificationSink for NatsSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            error!("NATS publisher task is gone");
        }
    }
}
