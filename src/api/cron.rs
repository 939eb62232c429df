//! Manual triggers for the scheduled jobs, guarded by the cron secret.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use chrono::Utc;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;

use super::{ApiError, ApiResult, AppState};
use crate::scheduler::Job;

/// `Authorization: Bearer <cron_secret>`. Without a configured secret every
/// request is refused.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let secret = state.config.cron_secret.as_deref().ok_or(ApiError::Unauthorized)?;
    if !bearer_matches(headers, secret) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Constant-time check of the bearer token against `secret`.
fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };
    !secret.is_empty() && bool::from(token.trim().as_bytes().ct_eq(secret.as_bytes()))
}

async fn trigger(state: AppState, headers: HeaderMap, job: Job) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let report = state.scheduler.run(job, Utc::now()).await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

/// POST /api/cron/reminders
pub async fn reminders(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    trigger(state, headers, Job::DailyReminders).await
}

/// POST /api/cron/promotions
pub async fn promotions(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    trigger(state, headers, Job::WeeklyPromotion).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_matches() {
        assert!(bearer_matches(&bearer("Bearer s3cret-token"), "s3cret-token"));
        assert!(bearer_matches(&bearer("Bearer  s3cret-token "), "s3cret-token"));
        // Same length, one byte off
        assert!(!bearer_matches(&bearer("Bearer s3cret-tokeN"), "s3cret-token"));
        assert!(!bearer_matches(&bearer("Bearer s3cret"), "s3cret-token"));
        assert!(!bearer_matches(&bearer("s3cret-token"), "s3cret-token"));
        assert!(!bearer_matches(&HeaderMap::new(), "s3cret-token"));
        assert!(!bearer_matches(&bearer("Bearer "), ""));
    }
}
