//! HTTP surface: task submission, per-task SSE progress streams,
//! health and metrics.

use crate::broker::TaskBroker;
use crate::coordinator::{StagedFile, TaskCoordinator, TaskRequest};
use crate::metrics::Metrics;
use agora_types::{CapabilityTag, TaskEvent, TaskId};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

const DEFAULT_INTENT: &str = "analyze";

/// Collaborator readiness derived from configuration at startup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub registry: bool,
    pub storage: bool,
    pub payment: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TaskCoordinator>,
    pub broker: TaskBroker,
    pub metrics: Metrics,
    pub health: HealthStatus,
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/task", post(start_task))
        .route("/api/task/:task_id/stream", get(stream_task))
        .route("/api/health", get(health))
        .route("/metrics", get(metrics_text))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": msg.into() })),
    )
}

/// Accept a task and return immediately; progress arrives over SSE.
///
/// The task channel is registered before the pipeline is spawned, so a
/// stream opened after this response cannot miss events.
async fn start_task(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut intent: Option<String> = None;
    let mut cid: Option<String> = None;
    let mut file: Option<StagedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "service" => {
                intent = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?,
                );
            }
            "cid" => {
                cid = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?,
                );
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .unwrap_or("upload.bin")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("file upload failed: {}", e)))?;
                file = Some(StagedFile {
                    bytes: bytes.to_vec(),
                    file_name,
                    content_type,
                });
            }
            other => {
                debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let request = TaskRequest {
        intent: intent.unwrap_or_else(|| DEFAULT_INTENT.to_string()),
        file,
        cid,
    };

    let task_id = TaskId::new();
    state.broker.register(task_id);
    state.metrics.tasks_started.inc();
    info!(%task_id, intent = %request.intent, "Task accepted");

    let coordinator = Arc::clone(&state.coordinator);
    tokio::spawn(async move {
        coordinator.run(task_id, request).await;
    });

    Ok(Json(json!({ "taskId": task_id, "success": true })))
}

/// Decrements the SSE connection gauge when the client goes away.
struct ConnectionGuard {
    metrics: Metrics,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.sse_connections.dec();
        debug!("SSE connection closed");
    }
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Per-task SSE stream. Events are named `step`, `done` or `error`;
/// the stream ends after the terminal event.
async fn stream_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<EventStream>, ApiError> {
    let Some(task_id) = TaskId::parse(&task_id) else {
        return Err(bad_request("invalid task id"));
    };

    state.metrics.sse_connections.inc();
    let guard = ConnectionGuard {
        metrics: state.metrics.clone(),
    };
    let rx = state.broker.subscribe(task_id);
    info!(%task_id, "SSE subscriber attached");

    let metrics = state.metrics.clone();
    let events = BroadcastStream::new(rx)
        .filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "SSE subscriber lagged");
                    None
                }
            }
        })
        .scan(false, |finished, event| {
            if *finished {
                return futures_util::future::ready(None);
            }
            if event.is_terminal() {
                *finished = true;
            }
            futures_util::future::ready(Some(event))
        })
        .map(move |event| {
            metrics.sse_messages_sent.inc();
            Ok(sse_event(&event))
        })
        .chain(stream::once(async move {
            // Stream is done; release the connection guard with it
            drop(guard);
            Ok(Event::default().comment("stream closed"))
        }));

    Ok(Sse::new(Box::pin(events) as EventStream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

fn sse_event(event: &TaskEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().event(event.event_type()).data(json),
        Err(e) => {
            warn!(error = %e, "Failed to serialize task event");
            Event::default().event("error").data("{}")
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let fallbacks: serde_json::Map<String, serde_json::Value> = [
        CapabilityTag::Analysis,
        CapabilityTag::StorageUpload,
        CapabilityTag::Retrieval,
    ]
    .into_iter()
    .map(|tag| (tag.to_string(), json!(tag.fallback_endpoint())))
    .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "registry": state.health.registry,
        "storage": state.health.storage,
        "payment": state.health.payment,
        "fallbackEndpoints": fallbacks,
        "activeTasks": state.broker.active_count(),
    }))
}

async fn metrics_text(State(state): State<AppState>) -> String {
    state.metrics.gather()
}
