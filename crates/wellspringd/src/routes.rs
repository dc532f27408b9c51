//! API routes.
//!
//! `POST /api/v1/search` creates a session and spawns its pipeline worker;
//! `GET /api/v1/stream/{id}` claims the session's event stream and forwards
//! it as newline-delimited JSON with subscriber-side heartbeats.

use crate::pipeline;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use wellspring_common::Event;

/// Heartbeats are injected here, on the subscriber side, so they keep
/// flowing while the worker sits inside a collaborator call and stop the
/// moment this stream ends. They are never queued on the bus.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

type AppStateArc = Arc<AppState>;

pub fn api_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/v1/search", post(create_search))
        .route("/api/v1/stream/:session_id", get(stream_session))
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct SessionCreated {
    id: String,
}

async fn create_search(
    State(state): State<AppStateArc>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SessionCreated>, (StatusCode, String)> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty query".to_string()));
    }

    let session = state.registry.create(query).await;
    info!(session = %session.id, "session created");

    tokio::spawn(pipeline::run_session(state.clone(), session.clone()));

    Ok(Json(SessionCreated {
        id: session.id.clone(),
    }))
}

async fn stream_session(
    State(state): State<AppStateArc>,
    Path(session_id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let session = state
        .registry
        .get(&session_id)
        .await
        .ok_or((StatusCode::NOT_FOUND, "unknown session".to_string()))?;

    let mut events = session
        .subscribe()
        .await
        .ok_or((StatusCode::CONFLICT, "stream already claimed".to_string()))?;

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(16);
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if send_line(&tx, &Event::Heartbeat).await.is_err() {
                        return;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { return };
                    let terminal = matches!(event, Event::SessionClosed);
                    if send_line(&tx, &event).await.is_err() || terminal {
                        return;
                    }
                }
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// One JSON object per line.
async fn send_line(tx: &mpsc::Sender<Result<Bytes, Infallible>>, event: &Event) -> Result<(), ()> {
    let mut line = serde_json::to_vec(event).map_err(|_| ())?;
    line.push(b'\n');
    tx.send(Ok(Bytes::from(line))).await.map_err(|_| ())
}
