use axum::Json;
use axum::extract::State;
use chrono::{Datelike, Utc};
use serde_json::{Value, json};

use super::{ApiResult, AppState};
use crate::scheduler::local_midnight;
use crate::store::DashboardStats;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "inkdesk",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/dashboard. "This month" is the studio's local calendar month.
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    let now = Utc::now();
    let today = now.with_timezone(&state.config.timezone).date_naive();
    let first_of_month = today.with_day(1).unwrap_or(today);
    let month_start = local_midnight(first_of_month, state.config.timezone);
    Ok(Json(state.db.dashboard_stats(now, month_start)?))
}
