use serde::{Deserialize, Serialize};

/// Semantic event logged alongside a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    End,
    NextSlide,
    PreviousSlide,
    NextSentence,
    Play,
    Stop,
}

/// One entry of a session's event log
///
/// `time` is in milliseconds relative to the session start once the session
/// has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub ty: EventKind,
    pub time: u64,
}

impl RecordEvent {
    pub fn new(ty: EventKind, time: u64) -> Self {
        Self { ty, time }
    }
}
