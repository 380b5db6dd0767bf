use super::state::AppState;
use crate::controller::{BindOutcome, ControllerStatus, UnbindOutcome};
use crate::device::{BindingSettings, DetectRequest};
use crate::error::{CaptureError, ErrorResponse};
use crate::notify::PortMessage;
use crate::recording::{EventKind, Record, RecordEvent};
use crate::upload::tracker_id;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectDevicesRequest {
    #[serde(default)]
    pub force_refresh: bool,
    /// Probe only this camera
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub outcome: BindOutcome,
}

#[derive(Debug, Serialize)]
pub struct UnbindResponse {
    pub outcome: UnbindOutcome,
}

#[derive(Debug, Serialize)]
pub struct StartRecordResponse {
    /// False when a take was already running or nothing is bound
    pub started: bool,
}

#[derive(Debug, Serialize)]
pub struct StopRecordResponse {
    pub events: Option<Vec<RecordEvent>>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterEventRequest {
    pub ty: EventKind,
}

#[derive(Debug, Serialize)]
pub struct RegisterEventResponse {
    pub registered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecordRequest {
    pub capsule_id: String,
    pub gos: usize,
    pub record: Record,
    pub task_id: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadRecordResponse {
    pub tracker: String,
}

#[derive(Debug, Serialize)]
pub struct AbortTaskResponse {
    pub aborted: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub controller: ControllerStatus,
    pub hook_installed: bool,
    pub pending_tasks: Vec<String>,
}

fn error_response(e: &CaptureError) -> Response {
    let status = match e {
        CaptureError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        CaptureError::Overconstrained { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CaptureError::Network(_) => StatusCode::BAD_GATEWAY,
        CaptureError::AbortedByUser => StatusCode::CONFLICT,
        CaptureError::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse::from(e))).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let ports = &state.ports;
    Json(StatusResponse {
        controller: ports.controller.status(),
        hook_installed: ports.acquirer.hook_installed(),
        pending_tasks: ports.tracker.pending(),
    })
}

/// GET /events
/// Stream every outbound notification
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!("Event stream subscriber connected");

    let rx = state.hub.subscribe();
    let client_id = state.client_id.clone();

    let stream = futures::stream::unfold(rx, move |mut rx| {
        let client_id = client_id.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        let port = notification.port();
                        let message = PortMessage::new(&client_id, notification);
                        return Some((Event::default().event(port).json_data(&message), rx));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event stream lagged, skipped {} notifications", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// POST /devices/detect
pub async fn detect_devices(
    State(state): State<AppState>,
    Json(req): Json<DetectDevicesRequest>,
) -> impl IntoResponse {
    info!("Detect devices (force_refresh={})", req.force_refresh);

    match state
        .ports
        .prober
        .detect(DetectRequest::explicit(req.force_refresh, req.device_id))
        .await
    {
        Ok(Some(detected)) => (StatusCode::OK, Json(detected)).into_response(),
        Ok(None) => (
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                status: "queued".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Device detection failed: {}", e);
            error_response(&e)
        }
    }
}

/// POST /devices/bind
pub async fn bind_device(
    State(state): State<AppState>,
    Json(settings): Json<BindingSettings>,
) -> impl IntoResponse {
    // Outlives the request when the client disconnects
    let ports = state.ports.clone();
    let bind = tokio::spawn(async move { ports.controller.bind(settings).await });

    match bind.await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(BindResponse { outcome })).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("Bind task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: "BIND_TASK_FAILED".to_string(),
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /devices/unbind
pub async fn unbind_device(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.ports.controller.unbind();
    Json(UnbindResponse { outcome })
}

/// POST /record/start
pub async fn start_record(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.ports.controller.start_recording();
    Json(StartRecordResponse { started })
}

/// POST /record/stop
pub async fn stop_record(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.ports.controller.stop_recording();
    Json(StopRecordResponse { events })
}

/// POST /record/event
pub async fn register_event(
    State(state): State<AppState>,
    Json(req): Json<RegisterEventRequest>,
) -> impl IntoResponse {
    let registered = state.ports.controller.register_event(req.ty);
    Json(RegisterEventResponse { registered })
}

/// POST /record/pointer
/// Record the pointer over an existing record
pub async fn start_pointer_record(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> impl IntoResponse {
    let started = state.ports.controller.start_pointer_recording(record);
    Json(StartRecordResponse { started })
}

/// POST /record/pointer-used
pub async fn mark_pointer_used(State(state): State<AppState>) -> impl IntoResponse {
    state.ports.controller.mark_pointer_used();
    StatusCode::NO_CONTENT
}

/// POST /records/play
pub async fn play_record(
    State(state): State<AppState>,
    Json(record): Json<Record>,
) -> impl IntoResponse {
    match state.ports.controller.play_record(&record).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /records/stop-playback
pub async fn stop_playback(State(state): State<AppState>) -> impl IntoResponse {
    match state.ports.controller.stop_playback().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /records/upload
/// Start an upload; progress arrives as `taskProgress` notifications
pub async fn upload_record(
    State(state): State<AppState>,
    Json(req): Json<UploadRecordRequest>,
) -> impl IntoResponse {
    let tracker = tracker_id(req.task_id);
    info!("Uploading record for {}/{} as {}", req.capsule_id, req.gos, tracker);

    let ports = state.ports.clone();
    tokio::spawn(async move {
        // Failures are reported through notifications
        let _ = ports
            .uploader
            .upload_record(&req.capsule_id, req.gos, &req.record, req.task_id)
            .await;
    });

    (StatusCode::ACCEPTED, Json(UploadRecordResponse { tracker }))
}

/// POST /tasks/:tracker/abort
pub async fn abort_task(
    State(state): State<AppState>,
    Path(tracker): Path<String>,
) -> impl IntoResponse {
    if state.ports.abort_task(&tracker) {
        (StatusCode::OK, Json(AbortTaskResponse { aborted: true })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                code: "UNKNOWN_TASK".to_string(),
                error: format!("No task tracked as {}", tracker),
            }),
        )
            .into_response()
    }
}

/// GET /storage
pub async fn get_storage(State(state): State<AppState>) -> impl IntoResponse {
    match state.ports.store.load() {
        Ok(config) => (StatusCode::OK, Json(config)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /storage
pub async fn put_storage(
    State(state): State<AppState>,
    Json(config): Json<Value>,
) -> impl IntoResponse {
    match state.ports.store.save(&config) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}
