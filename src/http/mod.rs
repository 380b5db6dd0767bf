//! HTTP control API
//!
//! Inbound ports of the capture service:
//! - POST /devices/detect, /devices/bind, /devices/unbind
//! - POST /record/start, /record/stop, /record/event, /record/pointer
//! - POST /records/play, /records/stop-playback, /records/upload
//! - POST /tasks/:tracker/abort
//! - GET/PUT /storage - Client configuration
//! - GET /events - Outbound notifications as server-sent events
//! - GET /status, GET /health

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
