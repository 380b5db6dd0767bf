use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        .route("/events", get(handlers::events))
        // Devices
        .route("/devices/detect", post(handlers::detect_devices))
        .route("/devices/bind", post(handlers::bind_device))
        .route("/devices/unbind", post(handlers::unbind_device))
        // Recording
        .route("/record/start", post(handlers::start_record))
        .route("/record/stop", post(handlers::stop_record))
        .route("/record/event", post(handlers::register_event))
        .route("/record/pointer", post(handlers::start_pointer_record))
        .route("/record/pointer-used", post(handlers::mark_pointer_used))
        // Records
        .route("/records/play", post(handlers::play_record))
        .route("/records/stop-playback", post(handlers::stop_playback))
        .route("/records/upload", post(handlers::upload_record))
        .route("/tasks/:tracker/abort", post(handlers::abort_task))
        // Client config
        .route("/storage", get(handlers::get_storage).put(handlers::put_storage))
        // The editor runs in a browser on another origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
