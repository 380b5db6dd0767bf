use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::blob::{BlobRef, LocalBlob, Record};
use super::event::RecordEvent;

/// Which recorder produced a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// Camera and microphone
    Primary,
    /// Pointer canvas
    Overlay,
}

#[derive(Debug, Clone)]
pub struct RecordedChunk {
    pub track: Track,
    pub blob: LocalBlob,
}

/// Handle given to a recorder for delivering its encoded output
#[derive(Debug, Clone)]
pub struct ChunkSink {
    track: Track,
    tx: mpsc::UnboundedSender<RecordedChunk>,
}

impl ChunkSink {
    pub fn new(track: Track, tx: mpsc::UnboundedSender<RecordedChunk>) -> Self {
        Self { track, tx }
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn deliver(&self, blob: LocalBlob) {
        if self.tx.send(RecordedChunk { track: self.track, blob }).is_err() {
            warn!("Chunk receiver closed, dropping {:?} chunk", self.track);
        }
    }
}

/// A stopped session waiting for its media
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub events: Vec<RecordEvent>,
    /// The overlay recorder ran and its chunk must be awaited
    pub expects_overlay: bool,
    /// The pointer was drawn, so the overlay blob is worth keeping
    pub pointer_used: bool,
    /// Pointer-only take over an already uploaded record
    pub existing: Option<Record>,
}

/// Pairs a closed session with the chunks of its recorders
///
/// Chunks may arrive before or after the session closes, in any order. The
/// record is released once the primary chunk (or the existing record) and,
/// when expected, the overlay chunk are both present.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    primary: Option<LocalBlob>,
    overlay: Option<LocalBlob>,
    closed: Option<ClosedSession>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close_session(&mut self, session: ClosedSession) -> Option<Record> {
        if self.closed.is_some() {
            warn!("Replacing a session that never received its media");
        }
        self.closed = Some(session);
        self.try_complete()
    }

    pub fn offer(&mut self, chunk: RecordedChunk) -> Option<Record> {
        debug!("Received {:?} chunk ({} bytes)", chunk.track, chunk.blob.data.len());

        match chunk.track {
            Track::Primary => self.primary = Some(chunk.blob),
            Track::Overlay => self.overlay = Some(chunk.blob),
        }

        self.try_complete()
    }

    pub fn is_waiting(&self) -> bool {
        self.closed.is_some()
    }

    fn try_complete(&mut self) -> Option<Record> {
        let session = self.closed.as_ref()?;

        let primary_ready = session.existing.is_some() || self.primary.is_some();
        let overlay_ready = !session.expects_overlay || self.overlay.is_some();

        if !primary_ready || !overlay_ready {
            return None;
        }

        let session = self.closed.take()?;
        let primary = self.primary.take();
        let overlay = self.overlay.take();

        let pointer_blob = if session.pointer_used {
            overlay.map(BlobRef::Local)
        } else {
            None
        };

        let record = match session.existing {
            Some(existing) => Record {
                webcam_blob: existing.webcam_blob,
                pointer_blob,
                events: existing.events,
            },
            None => Record {
                webcam_blob: BlobRef::Local(primary?),
                pointer_blob,
                events: session.events,
            },
        };

        Some(record)
    }
}
