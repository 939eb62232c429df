//! Bot administration and the WhatsApp Cloud API webhook.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{ApiError, ApiResult, AppState, ok};
use crate::bot::ConversationSnapshot;
use crate::bot::whatsapp::{SIGNATURE_HEADER, WebhookPayload, verify_signature, verify_subscription};

/// GET /api/bot/status
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let stats = state.bot.stats().await;
    Json(json!({
        "success": true,
        "whatsapp_live": state.messenger.is_live(),
        "dry_run": state.config.dry_run,
        "llm_model": state.config.llm.model,
        "conversations": stats,
    }))
}

/// GET /api/bot/conversations, most recent first.
pub async fn conversations(State(state): State<AppState>) -> Json<Vec<ConversationSnapshot>> {
    Json(state.bot.conversations().await)
}

/// DELETE /api/bot/conversations/:user_id
pub async fn reset_conversation(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<Value>> {
    if !state.bot.reset_conversation(&user_id).await {
        return Err(ApiError::NotFound(format!("no conversation with {user_id}")));
    }
    Ok(ok())
}

/// GET /webhook/whatsapp?hub.mode&hub.verify_token&hub.challenge
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    let expected = state
        .config
        .whatsapp
        .as_ref()
        .map(|w| w.verify_token.as_str())
        .unwrap_or_default();
    let param = |name: &str| params.get(name).map(String::as_str);
    match verify_subscription(param("hub.mode"), param("hub.verify_token"), param("hub.challenge"), expected) {
        Some(challenge) => {
            info!("WhatsApp webhook verified");
            Ok(challenge)
        }
        None => {
            warn!("Rejected WhatsApp webhook verification");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// POST /webhook/whatsapp
///
/// Acknowledges right away; replies are produced in background tasks so a
/// slow LLM never makes the Cloud API retry the delivery. With WhatsApp
/// configured the body must carry a valid app-secret signature.
pub async fn receive_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Value>> {
    if let Some(whatsapp) = &state.config.whatsapp {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(&whatsapp.app_secret, &body, signature) {
            warn!("Rejected WhatsApp webhook with a bad signature");
            return Err(ApiError::Unauthorized);
        }
    }
    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid webhook payload: {e}")))?;

    let messages = payload.text_messages();
    let received = messages.len();
    for message in messages {
        let bot = state.bot.clone();
        let messenger = state.messenger.clone();
        tokio::spawn(async move {
            bot.respond(&message, messenger.as_ref()).await;
        });
    }
    Ok(Json(json!({ "success": true, "received": received })))
}
