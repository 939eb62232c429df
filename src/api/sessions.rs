//! Per-device login sessions.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiResult, AppState, ok};
use crate::sessions::{SessionStatus, parse_user_agent};
use crate::store::UserSession;

#[derive(Debug, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    /// Client-computed device fingerprint; derived from the user agent when absent.
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutAll {
    /// Session to keep, usually the caller's own.
    #[serde(default)]
    pub except: Option<String>,
}

/// POST /api/sessions
///
/// Logging in again on the same device replaces the previous session. The
/// response tells the client how often to heartbeat and poll.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let device = parse_user_agent(user_agent, body.fingerprint.as_deref());
    let session = state.db.create_session(&body.user_id, &device, body.ip.as_deref())?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "session": session,
            "heartbeat_interval_secs": state.sessions.heartbeat_interval_secs,
            "validity_check_interval_secs": state.sessions.validity_check_interval_secs,
        })),
    ))
}

/// GET /api/sessions/:id, polled by each device.
pub async fn status(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SessionStatus>> {
    Ok(Json(state.sessions.session_status(&state.db, &id, Utc::now())?))
}

/// DELETE /api/sessions/:id
pub async fn logout(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.invalidate_session(&id, "logout")?;
    Ok(ok())
}

/// POST /api/sessions/:id/heartbeat
pub async fn heartbeat(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SessionStatus>> {
    Ok(Json(state.sessions.heartbeat(&state.db, &id, Utc::now())?))
}

/// GET /api/users/:user_id/sessions, active ones only.
pub async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<UserSession>>> {
    Ok(Json(state.sessions.list_active_sessions(&state.db, &user_id, Utc::now())?))
}

/// POST /api/users/:user_id/sessions/logout-all
pub async fn logout_all(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<LogoutAll>>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body.unwrap_or_default();
    let invalidated = state
        .db
        .invalidate_all_sessions(&user_id, body.except.as_deref(), "logout_all")?;
    Ok(Json(json!({ "success": true, "invalidated": invalidated })))
}
