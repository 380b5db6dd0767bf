//! Recording sessions and record assembly
//!
//! A session logs timestamped semantic events while the recorders run. When
//! it stops, the assembler pairs the event log with the encoded chunks the
//! recorders deliver asynchronously and produces a `Record`.

mod assembler;
mod blob;
mod event;
mod session;

pub use assembler::{ChunkSink, ClosedSession, RecordAssembler, RecordedChunk, Track};
pub use blob::{BlobRef, LocalBlob, Record};
pub use event::{EventKind, RecordEvent};
pub use session::RecordingSession;
