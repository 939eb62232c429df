use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{ApiResult, AppState, ok};
use crate::store::{Appointment, AppointmentFilter, AppointmentInput, AppointmentStatus};

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: AppointmentStatus,
}

/// GET /api/appointments?from&to&status&client_id
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AppointmentFilter>,
) -> ApiResult<Json<Vec<Appointment>>> {
    Ok(Json(state.db.list_appointments(&filter)?))
}

/// POST /api/appointments
///
/// 409 when the artist already has an appointment in that slot.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<AppointmentInput>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_appointment(input)?)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.db.get_appointment(&id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<AppointmentInput>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.db.update_appointment(&id, input)?))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_appointment(&id)?;
    Ok(ok())
}

/// POST /api/appointments/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.db.set_appointment_status(&id, change.status)?))
}
