use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use reqwest::{Body, Client};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CaptureError, CaptureResult};
use crate::recording::LocalBlob;

/// Receives the fraction of the body sent so far
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Sends a blob to the server and returns its JSON reply
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    async fn post(&self, path: &str, blob: LocalBlob, progress: ProgressFn) -> CaptureResult<Value>;
}

/// Transport over HTTP, authenticated with the session cookie
pub struct HttpTransport {
    client: Client,
    base_url: String,
    cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, cookie: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            cookie,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl UploadTransport for HttpTransport {
    async fn post(&self, path: &str, blob: LocalBlob, progress: ProgressFn) -> CaptureResult<Value> {
        let url = self.url(path);
        let total = blob.data.len();
        debug!("POST {} ({} bytes)", url, total);

        let data = Bytes::from(blob.data);
        let chunks: Vec<Bytes> = (0..total)
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(total)))
            .collect();

        let mut sent = 0usize;
        let body = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len();
            progress(sent as f64 / total as f64);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, blob.mime)
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body));

        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CaptureError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Network(format!("HTTP {} from {}", status, url)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CaptureError::Network(e.to_string()))
    }
}
