//! Payments, coupons and the price calculator.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, ApiResult, AppState, ok};
use crate::pricing::{self, Quote, QuoteRequest};
use crate::store::{Coupon, CouponInput, Payment, PaymentInput, PaymentSummary};

/// `from` inclusive, `to` exclusive.
#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CouponCheck {
    pub code: String,
    #[serde(default)]
    pub amount_cents: i64,
}

/// GET /api/payments?from&to
pub async fn list(State(state): State<AppState>, Query(period): Query<PeriodQuery>) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.db.list_payments(period.from, period.to)?))
}

/// POST /api/payments
///
/// A coupon code is checked and redeemed in the same transaction as the
/// payment; an unusable coupon fails the whole request.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<PaymentInput>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    Ok((StatusCode::CREATED, Json(state.db.record_payment(input)?)))
}

/// GET /api/payments/summary?from&to
pub async fn summary(
    State(state): State<AppState>,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<Json<PaymentSummary>> {
    Ok(Json(state.db.payment_summary(period.from, period.to)?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Payment>> {
    Ok(Json(state.db.get_payment(&id)?))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_payment(&id)?;
    Ok(ok())
}

pub async fn list_coupons(State(state): State<AppState>) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(state.db.list_coupons()?))
}

/// POST /api/coupons
///
/// 409 when the code already exists, ignoring case.
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(input): Json<CouponInput>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_coupon(input)?)))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CouponInput>,
) -> ApiResult<Json<Coupon>> {
    Ok(Json(state.db.update_coupon(&id, input)?))
}

pub async fn delete_coupon(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.delete_coupon(&id)?;
    Ok(ok())
}

/// POST /api/coupons/validate
///
/// Checks a code without using it. An unusable code is still a 200 with
/// `valid: false` and the reason.
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(check): Json<CouponCheck>,
) -> ApiResult<Json<Value>> {
    let body = match state.db.evaluate_coupon(&check.code, check.amount_cents, Utc::now())? {
        Ok(evaluation) => json!({
            "success": true,
            "valid": true,
            "coupon": evaluation.coupon,
            "amount_cents": evaluation.amount_cents,
            "discount_cents": evaluation.discount_cents,
            "final_cents": evaluation.final_cents,
        }),
        Err(rejection) => json!({
            "success": true,
            "valid": false,
            "reason": rejection,
            "message": rejection.message(),
        }),
    };
    Ok(Json(body))
}

/// POST /api/pricing/quote
pub async fn quote(State(state): State<AppState>, Json(request): Json<QuoteRequest>) -> ApiResult<Json<Quote>> {
    pricing::quote(&state.config.pricing, &request)
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest("size or size_cm is required".into()))
}
