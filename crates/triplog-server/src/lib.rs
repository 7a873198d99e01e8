//! Triplog Server - HTTP stream adapter
//!
//! Each session owns a trip detector fed by posted samples. Committed records
//! land in a shared store readable through `/api/records`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use triplog_core::{
    ActivityHint, CommittedRecord, InertialSample, PersistenceGateway, PositionSample,
    TrackingConfig,
};
use triplog_session::{MemoryStore, Session, SessionError, SessionHandle, SessionStats};

/// Records kept in memory for `/api/records`; older ones are dropped.
pub const DEFAULT_RECORD_LIMIT: usize = 100_000;
use uuid::Uuid;

/// Sessions live until `DELETE /api/sessions/{id}`; there is no idle expiry.
/// The record store keeps the newest [`DEFAULT_RECORD_LIMIT`] records unless
/// [`AppState::with_record_limit`] says otherwise.
pub struct AppState {
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
    store: Arc<MemoryStore>,
    /// Extra sink every commit is also written to (e.g. a CSV file).
    mirror: Option<Arc<dyn PersistenceGateway>>,
    defaults: TrackingConfig,
}

impl AppState {
    pub fn new(defaults: TrackingConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store: Arc::new(MemoryStore::with_limit(DEFAULT_RECORD_LIMIT)),
            mirror: None,
            defaults,
        }
    }

    /// Replace the in-memory store with one keeping at most `limit` records.
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.store = Arc::new(MemoryStore::with_limit(limit));
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn PersistenceGateway>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn gateway(&self) -> Arc<dyn PersistenceGateway> {
        match &self.mirror {
            Some(mirror) => Arc::new(Mirrored {
                store: self.store.clone(),
                mirror: mirror.clone(),
            }),
            None => self.store.clone(),
        }
    }
}

/// Writes to the mirror first; the record is only visible in the store once
/// the mirror accepted it.
struct Mirrored {
    store: Arc<MemoryStore>,
    mirror: Arc<dyn PersistenceGateway>,
}

impl PersistenceGateway for Mirrored {
    fn append(&self, record: &CommittedRecord) -> Result<(), triplog_core::GatewayError> {
        self.mirror.append(record)?;
        self.store.append(record)
    }
}

/// Creates the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sessions", post(handle_create_session))
        .route("/api/sessions/{id}", axum::routing::delete(handle_stop_session))
        .route("/api/sessions/{id}/position", post(handle_position))
        .route("/api/sessions/{id}/inertial", post(handle_inertial))
        .route("/api/sessions/{id}/config", put(handle_config))
        .route("/api/sessions/{id}/stats", get(handle_stats))
        .route("/api/records", get(handle_records))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ApiError {
    UnknownSession(Uuid),
    BadRequest(String),
    Session(SessionError),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::UnknownSession(id) => (StatusCode::NOT_FOUND, format!("unknown session {id}")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Session(e @ SessionError::QueueFull) => {
                (StatusCode::TOO_MANY_REQUESTS, e.to_string())
            }
            Self::Session(e @ SessionError::Stopped) => (StatusCode::GONE, e.to_string()),
            Self::Session(e @ SessionError::Config(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub id: Uuid,
    pub config: TrackingConfig,
}

/// Body is an optional config; missing fields take the server defaults.
async fn handle_create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SessionCreated>)> {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        state.defaults.clone()
    } else {
        let mut value = serde_json::to_value(&state.defaults)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let patch: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        merge(&mut value, patch);
        serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let handle = Session::start(config.clone(), state.gateway())?;
    let id = Uuid::new_v4();
    state.sessions.lock().await.insert(id, handle);
    info!(%id, "session created");
    Ok((StatusCode::CREATED, Json(SessionCreated { id, config })))
}

fn merge(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (k, v) in patch {
                base.insert(k, v);
            }
        }
        (base, patch) => *base = patch,
    }
}

async fn handle_stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionStats>> {
    let handle = state
        .sessions
        .lock()
        .await
        .remove(&id)
        .ok_or(ApiError::UnknownSession(id))?;
    let stats = handle.stop().await;
    info!(%id, "session stopped");
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionBody {
    #[serde(flatten)]
    pub sample: PositionSample,
    #[serde(default)]
    pub hint: Option<ActivityHint>,
}

async fn handle_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<PositionBody>,
) -> ApiResult<StatusCode> {
    let sessions = state.sessions.lock().await;
    let handle = sessions.get(&id).ok_or(ApiError::UnknownSession(id))?;
    handle.on_position_sample(body.sample, body.hint)?;
    Ok(StatusCode::ACCEPTED)
}

async fn handle_inertial(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(sample): Json<InertialSample>,
) -> ApiResult<StatusCode> {
    let sessions = state.sessions.lock().await;
    let handle = sessions.get(&id).ok_or(ApiError::UnknownSession(id))?;
    handle.on_inertial_sample(sample)?;
    Ok(StatusCode::ACCEPTED)
}

async fn handle_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(config): Json<TrackingConfig>,
) -> ApiResult<Json<TrackingConfig>> {
    let sessions = state.sessions.lock().await;
    let handle = sessions.get(&id).ok_or(ApiError::UnknownSession(id))?;
    if let Err(e) = handle.update_config(config) {
        warn!(%id, error = %e, "config update refused");
        return Err(e.into());
    }
    Ok(Json(handle.config()))
}

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    /// Wait for queued samples to be processed first.
    #[serde(default)]
    sync: bool,
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<StatsQuery>,
) -> ApiResult<Json<SessionStats>> {
    // The map lock is released before waiting on the worker.
    let monitor = state
        .sessions
        .lock()
        .await
        .get(&id)
        .map(SessionHandle::monitor)
        .ok_or(ApiError::UnknownSession(id))?;
    if q.sync {
        monitor.sync().await?;
    }
    Ok(Json(monitor.stats()))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RecordsQuery {
    /// Only records strictly newer than this timestamp.
    since: Option<f64>,
    limit: Option<usize>,
}

async fn handle_records(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecordsQuery>,
) -> Json<Vec<CommittedRecord>> {
    Json(
        state
            .store
            .records_since(q.since, q.limit.unwrap_or(usize::MAX)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(TrackingConfig {
            sample_rate: 3,
            ring_buffer_capacity: 4,
            ..TrackingConfig::default()
        }));
        (create_router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let body = if body.is_null() {
            Body::empty()
        } else {
            Body::from(body.to_string())
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, body: serde_json::Value) -> String {
        let (status, v) = send(app, Method::POST, "/api/sessions", body).await;
        assert_eq!(status, StatusCode::CREATED);
        v["id"].as_str().unwrap().to_string()
    }

    fn position(t: f64, speed: f64) -> serde_json::Value {
        json!({ "timestamp": t, "latitude": 1.0, "longitude": 2.0, "speed": speed })
    }

    #[tokio::test]
    async fn test_trip_over_http() {
        let (app, _) = app();
        let id = create(&app, serde_json::Value::Null).await;
        let uri = format!("/api/sessions/{id}/position");

        for (t, speed) in [(0.0, 0.0), (1.0, 1.2), (2.0, 3.0), (3.0, 4.0), (4.0, 5.0), (5.0, 5.0)] {
            let (status, _) = send(&app, Method::POST, &uri, position(t, speed)).await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }

        let (status, stats) =
            send(&app, Method::GET, &format!("/api/sessions/{id}/stats?sync=true"), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["positions"], 6);
        assert_eq!(stats["trips"], 1);

        let (status, final_stats) =
            send(&app, Method::DELETE, &format!("/api/sessions/{id}"), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        // Flush of 0 and 1, then the counter fires on the third trip sample.
        assert_eq!(final_stats["commits_written"], 3);

        let (_, records) = send(&app, Method::GET, "/api/records", serde_json::Value::Null).await;
        let ts: Vec<f64> = records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["timestamp"].as_f64().unwrap())
            .collect();
        assert_eq!(ts, vec![0.0, 1.0, 4.0]);

        let (_, newer) = send(&app, Method::GET, "/api/records?since=1.0&limit=1", serde_json::Value::Null).await;
        assert_eq!(newer.as_array().unwrap().len(), 1);
        assert_eq!(newer[0]["timestamp"], 4.0);
    }

    #[tokio::test]
    async fn test_hint_lands_in_note() {
        let (app, _) = app();
        let id = create(&app, json!({ "sample_rate": 1 })).await;
        let mut body = position(0.0, 10.0);
        body["hint"] = json!("automotive");
        let (status, _) = send(&app, Method::POST, &format!("/api/sessions/{id}/position"), body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        send(&app, Method::DELETE, &format!("/api/sessions/{id}"), serde_json::Value::Null).await;

        let (_, records) = send(&app, Method::GET, "/api/records", serde_json::Value::Null).await;
        assert_eq!(records[0]["note"], "driving;hint=automotive");
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (app, _) = app();
        let uri = format!("/api/sessions/{}/position", Uuid::new_v4());
        let (status, body) = send(&app, Method::POST, &uri, position(0.0, 1.0)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("unknown session"));
    }

    #[tokio::test]
    async fn test_config_reload_and_rejection() {
        let (app, _) = app();
        let id = create(&app, serde_json::Value::Null).await;
        let uri = format!("/api/sessions/{id}/config");

        let mut config = serde_json::to_value(TrackingConfig::default()).unwrap();
        config["sample_rate"] = json!(7);
        let (status, applied) = send(&app, Method::PUT, &uri, config.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["sample_rate"], 7);

        config["sample_rate"] = json!(0);
        let (status, _) = send(&app, Method::PUT, &uri, config).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_invalid_create_body() {
        let (app, _) = app();
        let (status, _) = send(&app, Method::POST, "/api/sessions", json!({ "sample_rate": 0 })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/sessions")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_speed_counted_not_failed() {
        let (app, _) = app();
        let id = create(&app, serde_json::Value::Null).await;
        let (status, _) =
            send(&app, Method::POST, &format!("/api/sessions/{id}/position"), position(0.0, -1.0)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (_, stats) =
            send(&app, Method::GET, &format!("/api/sessions/{id}/stats?sync=true"), serde_json::Value::Null).await;
        assert_eq!(stats["rejected"], 1);
        assert_eq!(stats["buffered"], 0);
    }

    #[tokio::test]
    async fn test_inertial_accepted() {
        let (app, _) = app();
        let id = create(&app, serde_json::Value::Null).await;
        let body = json!({
            "timestamp": 0.0,
            "accel": [0.0, 0.0, 9.81],
            "gyro": [0.0, 0.0, 0.0],
            "attitude": { "pitch": 0.0, "yaw": 0.0, "roll": 0.0 }
        });
        let (status, _) = send(&app, Method::POST, &format!("/api/sessions/{id}/inertial"), body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (_, stats) =
            send(&app, Method::GET, &format!("/api/sessions/{id}/stats?sync=true"), serde_json::Value::Null).await;
        assert_eq!(stats["inertial"], 1);
    }

    #[tokio::test]
    async fn test_stats_sync_does_not_hold_session_map() {
        let state = Arc::new(AppState::new(TrackingConfig::default()));
        let app = create_router(state.clone());
        let handle = Session::start(
            TrackingConfig {
                queue_capacity: 2,
                ..TrackingConfig::default()
            },
            state.gateway(),
        )
        .unwrap();
        // The worker has not run yet, so the queue stays full.
        handle.on_position_sample(PositionSample::new(0.0, 1.0, 2.0, 0.0), None).unwrap();
        handle.on_position_sample(PositionSample::new(1.0, 1.0, 2.0, 0.0), None).unwrap();
        let id = Uuid::new_v4();
        state.sessions.lock().await.insert(id, handle);

        let req = Request::builder()
            .uri(format!("/api/sessions/{id}/stats?sync=true"))
            .body(Body::empty())
            .unwrap();
        let mut pending = Box::pin(app.clone().oneshot(req));
        let waiting = std::future::poll_fn(|cx| {
            std::task::Poll::Ready(std::future::Future::poll(pending.as_mut(), cx).is_pending())
        })
        .await;
        assert!(waiting);
        assert!(state.sessions.try_lock().is_ok());

        let res = pending.await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stats["positions"], 2);
    }
}
