use tokio::time::Instant;

use super::event::{EventKind, RecordEvent};

/// Event log of one in-progress recording
///
/// The synthetic `start` event carries the absolute start time (ms since the
/// controller epoch) until the session finishes, at which point it is
/// rewritten to `0` and an `end` event is appended.
#[derive(Debug)]
pub struct RecordingSession {
    started_at: Instant,
    events: Vec<RecordEvent>,
}

impl RecordingSession {
    pub fn start(epoch: Instant, now: Instant) -> Self {
        let absolute = millis_between(epoch, now);

        Self {
            started_at: now,
            events: vec![RecordEvent::new(EventKind::Start, absolute)],
        }
    }

    pub fn register(&mut self, ty: EventKind, now: Instant) {
        let time = self.offset(now);
        self.events.push(RecordEvent::new(ty, time));
    }

    pub fn events(&self) -> &[RecordEvent] {
        &self.events
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Close the log and return zero-based events ending with `end`
    pub fn finish(mut self, now: Instant) -> Vec<RecordEvent> {
        let time = self.offset(now);
        self.events.push(RecordEvent::new(EventKind::End, time));
        self.events[0].time = 0;
        self.events
    }

    fn offset(&self, now: Instant) -> u64 {
        millis_between(self.started_at, now)
    }
}

fn millis_between(from: Instant, to: Instant) -> u64 {
    to.saturating_duration_since(from).as_millis() as u64
}
