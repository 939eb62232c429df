use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, ApiResult, AppState, ok};
use crate::bot::whatsapp::whatsapp_link as wa_link;
use crate::store::{Client, ClientInput};

#[derive(Debug, Deserialize)]
pub struct ClientQuery {
    /// Matches name, phone or email.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub text: Option<String>,
}

/// GET /api/clients?q=
pub async fn list(State(state): State<AppState>, Query(query): Query<ClientQuery>) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(state.db.list_clients(query.q.as_deref())?))
}

/// POST /api/clients
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<ClientInput>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_client(input)?)))
}

/// GET /api/clients/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Client>> {
    Ok(Json(state.db.get_client(&id)?))
}

/// PUT /api/clients/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ClientInput>,
) -> ApiResult<Json<Client>> {
    Ok(Json(state.db.update_client(&id, input)?))
}

/// DELETE /api/clients/:id
///
/// Refused with 409 while the client still has appointments.
pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_client(&id)?;
    Ok(ok())
}

/// GET /api/clients/:id/whatsapp-link?text=
pub async fn whatsapp_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LinkQuery>,
) -> ApiResult<Json<Value>> {
    let client = state.db.get_client(&id)?;
    let phone = client
        .phone
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest(format!("{} has no phone number", client.name)))?;
    let url = wa_link(phone, query.text.as_deref())
        .ok_or_else(|| ApiError::BadRequest(format!("'{phone}' is not a valid WhatsApp number")))?;
    Ok(Json(json!({ "success": true, "url": url })))
}
