use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{ApiResult, AppState, ok};
use crate::store::{InventoryItem, InventoryItemInput, MovementInput, StockMovement};

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub low_stock: bool,
}

/// GET /api/inventory?low_stock=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    Ok(Json(state.db.list_inventory(query.low_stock)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<InventoryItemInput>,
) -> ApiResult<(StatusCode, Json<InventoryItem>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_inventory_item(input)?)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<InventoryItem>> {
    Ok(Json(state.db.get_inventory_item(&id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<InventoryItemInput>,
) -> ApiResult<Json<InventoryItem>> {
    Ok(Json(state.db.update_inventory_item(&id, input)?))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_inventory_item(&id)?;
    Ok(ok())
}

/// GET /api/inventory/:id/movements, newest first.
pub async fn movements(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    Ok(Json(state.db.list_movements(&id)?))
}

/// POST /api/inventory/:id/movements
///
/// An `out` larger than the stock on hand is a 400.
pub async fn record_movement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(movement): Json<MovementInput>,
) -> ApiResult<(StatusCode, Json<StockMovement>)> {
    Ok((StatusCode::CREATED, Json(state.db.record_movement(&id, movement)?)))
}
