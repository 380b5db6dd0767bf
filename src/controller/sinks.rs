use tracing::debug;

use crate::device::{MediaRecorder, RecorderOptions};
use crate::error::CaptureResult;
use crate::recording::{ChunkSink, Record};

/// Where the live stream and replays are shown
#[async_trait::async_trait]
pub trait PreviewSink: Send + Sync {
    /// Show the live stream
    async fn attach(&self, stream_id: &str, muted: bool) -> CaptureResult<()>;

    /// Replay a record; resolves when playback ends
    async fn play(&self, record: &Record) -> CaptureResult<()>;
}

/// Source of the pointer-overlay stream recorded for premium accounts
pub trait OverlaySource: Send + Sync {
    fn recorder(&self, options: &RecorderOptions, sink: ChunkSink) -> CaptureResult<Box<dyn MediaRecorder>>;
}

/// Preview that shows nothing; replays end immediately
#[derive(Debug, Default)]
pub struct NullPreview;

#[async_trait::async_trait]
impl PreviewSink for NullPreview {
    async fn attach(&self, stream_id: &str, _muted: bool) -> CaptureResult<()> {
        debug!("Preview attached to stream {}", stream_id);
        Ok(())
    }

    async fn play(&self, record: &Record) -> CaptureResult<()> {
        debug!("Replaying record with {} events", record.events.len());
        Ok(())
    }
}
