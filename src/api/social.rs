//! Artist networking feed, private chats and user profiles.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{ApiResult, AppState, ok};
use crate::notify::first_message_email;
use crate::store::{
    ChatOverview, Comment, CommentInput, NetworkingPost, PostInput, PrivateChat, ProfileInput, StoreError,
    UserProfile,
};

const DEFAULT_FEED_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OptionalUserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
}

/// GET /api/networking/posts?limit=
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<NetworkingPost>>> {
    Ok(Json(state.db.list_posts(query.limit.unwrap_or(DEFAULT_FEED_LIMIT))?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<PostInput>,
) -> ApiResult<(StatusCode, Json<NetworkingPost>)> {
    Ok((StatusCode::CREATED, Json(state.db.create_post(input)?)))
}

/// DELETE /api/networking/posts/:id?user_id, author only.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(user): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    state.db.delete_post(&id, &user.user_id)?;
    Ok(ok())
}

/// POST /api/networking/posts/:id/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(user): Json<UserBody>,
) -> ApiResult<Json<Value>> {
    let (post, liked) = state.db.toggle_like(&id, &user.user_id)?;
    Ok(Json(json!({ "success": true, "liked": liked, "likes": post.likes.len() })))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CommentInput>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    Ok((StatusCode::CREATED, Json(state.db.add_comment(&id, input)?)))
}

/// DELETE /api/networking/posts/:id/comments/:comment_id?user_id
pub async fn delete_comment(
    State(state): State<AppState>,
    Path((id, comment_id)): Path<(String, String)>,
    Query(user): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    state.db.delete_comment(&id, &comment_id, &user.user_id)?;
    Ok(ok())
}

/// GET /api/chats?user_id
pub async fn list_chats(
    State(state): State<AppState>,
    Query(user): Query<UserQuery>,
) -> ApiResult<Json<Vec<ChatOverview>>> {
    Ok(Json(state.db.chats_for_user(&user.user_id)?))
}

/// POST /api/chats/messages
///
/// The message that opens a chat emails the recipient, when their profile
/// has an address. Delivery failures are logged, not returned.
pub async fn send_message(
    State(state): State<AppState>,
    Json(message): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let sent = state
        .db
        .send_private_message(&message.sender_id, &message.recipient_id, &message.text)?;

    let mut notified = false;
    if sent.first_message {
        let recipient = optional_profile(&state, &message.recipient_id)?;
        match recipient.and_then(|p| p.email) {
            Some(email) => {
                let sender_name = optional_profile(&state, &message.sender_id)?
                    .map(|p| p.display_name)
                    .unwrap_or_else(|| message.sender_id.clone());
                let email = first_message_email(&email, &sender_name, &message.text, &state.config.studio.name);
                match state.notifier.send_email(&email).await {
                    Ok(()) => notified = true,
                    Err(e) => warn!("First-message email to {} failed: {}", message.recipient_id, e),
                }
            }
            None => info!("No email for {}, skipping first-message notification", message.recipient_id),
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "chat_id": sent.chat.id,
            "message": sent.message,
            "first_message": sent.first_message,
            "notified": notified,
        })),
    ))
}

fn optional_profile(state: &AppState, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
    match state.db.get_profile(user_id) {
        Ok(profile) => Ok(Some(profile)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// GET /api/chats/:id?user_id. With `user_id`, only participants may read.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(user): Query<OptionalUserQuery>,
) -> ApiResult<Json<PrivateChat>> {
    let chat = state.db.get_chat(&id)?;
    if let Some(user_id) = user.user_id
        && !chat.has_participant(&user_id)
    {
        return Err(StoreError::Forbidden(format!("{user_id} is not in this chat")).into());
    }
    Ok(Json(chat))
}

/// POST /api/chats/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(user): Json<UserBody>,
) -> ApiResult<Json<Value>> {
    let marked = state.db.mark_chat_read(&id, &user.user_id)?;
    Ok(Json(json!({ "success": true, "marked": marked })))
}

pub async fn get_profile(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.db.get_profile(&user_id)?))
}

pub async fn put_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(input): Json<ProfileInput>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.db.upsert_profile(&user_id, input)?))
}
