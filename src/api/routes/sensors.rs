//! Sensor Routes
//!
//! Session control and sample ingest.
//!
//! - POST /api/v1/sensors/start - Start monitoring a user
//! - POST /api/v1/sensors/stop - Stop monitoring a user
//! - POST /api/v1/sensors/samples - Push an external sample
//! - GET /api/v1/sensors - List active sessions
//! - GET /api/v1/sensors/:user_id - Session snapshot

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{status, SessionListResponse, StartResponse, StopRequest, StopResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::classifier::AnxietyAnalysis;
use crate::sensor::Sample;
use crate::session::{SessionConfig, SessionSnapshot};

/// POST /api/v1/sensors/start
///
/// Idempotent: an active user gets its existing session back.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SessionConfig>,
) -> ApiResult<Json<StartResponse>> {
    let started = state.monitor.start(config).await?;

    let status = if started.created {
        status::STARTED
    } else {
        status::ALREADY_ACTIVE
    };

    Ok(Json(StartResponse {
        status: status.to_string(),
        session: started.session,
    }))
}

/// POST /api/v1/sensors/stop
///
/// Always 200; stopping an inactive user reports "not_active".
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopRequest>,
) -> ApiResult<Json<StopResponse>> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::Validation("userId is required".to_string()));
    }

    let session = state.monitor.stop(&req.user_id).await;
    let status = if session.is_some() {
        status::STOPPED
    } else {
        status::NOT_ACTIVE
    };

    Ok(Json(StopResponse {
        status: status.to_string(),
        session,
    }))
}

/// POST /api/v1/sensors/samples
pub async fn ingest_sample(
    State(state): State<Arc<AppState>>,
    Json(sample): Json<Sample>,
) -> ApiResult<Json<AnxietyAnalysis>> {
    let analysis = state.monitor.ingest(sample).await?;
    Ok(Json(analysis))
}

/// GET /api/v1/sensors
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let sessions = state.monitor.list_sessions().await;
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /api/v1/sensors/:user_id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let snapshot = state.monitor.get_state(&user_id).await?;
    Ok(Json(snapshot))
}
