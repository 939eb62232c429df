use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{ApiResult, AppState, ok};
use crate::store::{PortfolioInput, PortfolioItem};

#[derive(Debug, Deserialize)]
pub struct PortfolioQuery {
    pub style: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

/// GET /api/portfolio?style&featured
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> ApiResult<Json<Vec<PortfolioItem>>> {
    Ok(Json(state.db.list_portfolio(query.style.as_deref(), query.featured)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<PortfolioInput>,
) -> ApiResult<(StatusCode, Json<PortfolioItem>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_portfolio_item(input)?)))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<PortfolioItem>> {
    Ok(Json(state.db.get_portfolio_item(&id)?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<PortfolioInput>,
) -> ApiResult<Json<PortfolioItem>> {
    Ok(Json(state.db.update_portfolio_item(&id, input)?))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_portfolio_item(&id)?;
    Ok(ok())
}
