use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::task::{Task, TaskProgress};
use crate::notify::{Notification, NotificationSink};

struct PendingTask {
    task: Task,
    abort: AbortHandle,
}

/// Transfers in flight, keyed by tracker id
pub struct TaskTracker {
    pending: Mutex<HashMap<String, PendingTask>>,
    notifier: Arc<dyn NotificationSink>,
}

impl TaskTracker {
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    pub fn register(&self, tracker: &str, task: Task, abort: AbortHandle) {
        debug!("Tracking transfer {}", tracker);
        self.pending
            .lock()
            .insert(tracker.to_string(), PendingTask { task, abort });
    }

    /// Forget a finished transfer; `false` if it was not tracked
    pub fn complete(&self, tracker: &str) -> bool {
        self.pending.lock().remove(tracker).is_some()
    }

    /// Cancel a transfer and report it as aborted
    pub fn abort(&self, tracker: &str) -> bool {
        let Some(pending) = self.pending.lock().remove(tracker) else {
            warn!("No transfer tracked as {}", tracker);
            return false;
        };

        pending.abort.abort();
        info!("Aborted transfer {}", tracker);

        self.notifier
            .notify(Notification::TaskProgress(TaskProgress::aborted(pending.task)));
        true
    }

    pub fn pending(&self) -> Vec<String> {
        let mut trackers: Vec<String> = self.pending.lock().keys().cloned().collect();
        trackers.sort();
        trackers
    }
}
