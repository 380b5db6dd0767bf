use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::recording::RecordEvent;

/// Server view of a capsule; only the fields the uploader touches are typed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub structure: Vec<Gos>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One group of slides
///
/// Events stay raw so groups carrying event types this client does not know
/// still deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gos {
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Capsule {
    /// Attach the event log to a group and return its record descriptor
    pub fn set_events(&mut self, gos: usize, events: &[RecordEvent]) -> Option<Value> {
        let entry = self.structure.get_mut(gos)?;
        entry.events = events
            .iter()
            .filter_map(|event| serde_json::to_value(event).ok())
            .collect();
        entry.record.clone()
    }
}
