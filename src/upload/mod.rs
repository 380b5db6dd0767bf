//! Record upload with progress reporting and cancellation

mod capsule;
mod task;
mod tracker;
mod transport;
mod uploader;

pub use capsule::{Capsule, Gos};
pub use task::{tracker_id, Task, TaskKind, TaskProgress};
pub use tracker::TaskTracker;
pub use transport::{HttpTransport, ProgressFn, UploadTransport};
pub use uploader::RecordUploader;
