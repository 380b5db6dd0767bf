use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::capsule::Capsule;
use super::task::{tracker_id, Task, TaskProgress};
use super::tracker::TaskTracker;
use super::transport::{ProgressFn, UploadTransport};
use crate::error::{CaptureError, CaptureResult};
use crate::notify::{Notification, NotificationSink};
use crate::recording::{BlobRef, LocalBlob, Record};

/// Uploads finished records and reports progress as `taskProgress`
pub struct RecordUploader {
    transport: Arc<dyn UploadTransport>,
    tracker: Arc<TaskTracker>,
    notifier: Arc<dyn NotificationSink>,
}

impl RecordUploader {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        tracker: Arc<TaskTracker>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            transport,
            tracker,
            notifier,
        }
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    /// Upload the blobs of `record` that are not on the server yet
    ///
    /// Returns the uploaded record descriptor, or `None` when nothing had to
    /// be sent.
    pub async fn upload_record(
        &self,
        capsule_id: &str,
        gos: usize,
        record: &Record,
        task_id: u64,
    ) -> CaptureResult<Option<Value>> {
        let task = Task::upload_record(task_id, capsule_id, gos);

        match self.transfer(&task, record).await {
            Ok(None) => {
                info!("Record for {}/{} already uploaded", capsule_id, gos);
                Ok(None)
            }
            Ok(Some(reply)) => {
                let mut capsule: Capsule = serde_json::from_value(reply).map_err(|e| {
                    self.notifier.notify(Notification::UploadRecordFailed);
                    CaptureError::from(e)
                })?;

                let value = capsule.set_events(gos, &record.events);
                if value.is_none() {
                    warn!("Capsule {} has no gos {}", capsule_id, gos);
                }

                let mut finished = task;
                finished.value = value.clone();
                self.notifier
                    .notify(Notification::TaskProgress(TaskProgress::finished(finished)));

                info!("Uploaded record for {}/{}", capsule_id, gos);
                Ok(value)
            }
            Err(CaptureError::AbortedByUser) => {
                info!("Upload of {}/{} aborted", capsule_id, gos);
                Err(CaptureError::AbortedByUser)
            }
            Err(e) => {
                error!("Failed to upload record for {}/{}: {}", capsule_id, gos, e);
                self.notifier.notify(Notification::UploadRecordFailed);
                Err(e)
            }
        }
    }

    async fn transfer(&self, task: &Task, record: &Record) -> CaptureResult<Option<Value>> {
        let record_path = format!("/api/upload-record/{}/{}", task.capsule_id, task.gos);
        let pointer_path = format!("/api/upload-pointer/{}/{}", task.capsule_id, task.gos);

        let pointer = match &record.pointer_blob {
            Some(BlobRef::Local(blob)) => Some(blob),
            _ => None,
        };

        match &record.webcam_blob {
            BlobRef::Remote(_) => match pointer {
                None => Ok(None),
                Some(pointer) => {
                    let reply = self.send(task, pointer_path, pointer.clone(), (0.0, 1.0)).await?;
                    Ok(Some(reply))
                }
            },
            BlobRef::Local(webcam) => {
                if record.pointer_blob.is_none() {
                    let reply = self.send(task, record_path, webcam.clone(), (0.0, 1.0)).await?;
                    return Ok(Some(reply));
                }

                let reply = self.send(task, record_path, webcam.clone(), (0.0, 0.5)).await?;
                match pointer {
                    Some(pointer) => {
                        let reply = self.send(task, pointer_path, pointer.clone(), (0.5, 1.0)).await?;
                        Ok(Some(reply))
                    }
                    None => Ok(Some(reply)),
                }
            }
        }
    }

    /// One tracked POST whose progress is mapped onto `range`
    async fn send(&self, task: &Task, path: String, blob: LocalBlob, range: (f64, f64)) -> CaptureResult<Value> {
        let tracker = tracker_id(task.task_id);
        let (low, high) = range;

        let notifier = Arc::clone(&self.notifier);
        let progress_task = task.clone();
        let progress: ProgressFn = Arc::new(move |fraction| {
            notifier.notify(Notification::TaskProgress(TaskProgress::running(
                progress_task.clone(),
                low + (high - low) * fraction,
            )));
        });

        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move { transport.post(&path, blob, progress).await });
        self.tracker.register(&tracker, task.clone(), handle.abort_handle());

        let result = handle.await;
        self.tracker.complete(&tracker);

        match result {
            Ok(reply) => reply,
            Err(e) if e.is_cancelled() => Err(CaptureError::AbortedByUser),
            Err(e) => Err(CaptureError::Network(format!("Upload task failed: {}", e))),
        }
    }
}
