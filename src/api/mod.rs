//! HTTP API consumed by the studio's web app and by WhatsApp webhooks.

pub mod appointments;
pub mod bot;
pub mod clients;
pub mod cron;
pub mod dashboard;
pub mod error;
pub mod inventory;
pub mod payments;
pub mod portfolio;
pub mod sessions;
pub mod social;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::{delete, get, post, put};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::bot::{BotEngine, Messenger};
use crate::config::Config;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::sessions::SessionPolicy;
use crate::store::Database;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bot: Arc<BotEngine>,
    pub messenger: Arc<dyn Messenger>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: Arc<Scheduler>,
    pub sessions: SessionPolicy,
    pub config: Arc<Config>,
}

/// `{"success": true}` for actions with nothing else to report.
pub(crate) fn ok() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub fn build_router(state: AppState) -> Router {
    let studio: Router<AppState> = Router::new()
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/clients", get(clients::list).post(clients::create))
        .route("/api/clients/:id", get(clients::get).put(clients::update).delete(clients::remove))
        .route("/api/clients/:id/whatsapp-link", get(clients::whatsapp_link))
        .route("/api/appointments", get(appointments::list).post(appointments::create))
        .route(
            "/api/appointments/:id",
            get(appointments::get).put(appointments::update).delete(appointments::remove),
        )
        .route("/api/appointments/:id/status", post(appointments::set_status))
        .route("/api/inventory", get(inventory::list).post(inventory::create))
        .route("/api/inventory/:id", get(inventory::get).put(inventory::update).delete(inventory::remove))
        .route("/api/inventory/:id/movements", get(inventory::movements).post(inventory::record_movement))
        .route("/api/portfolio", get(portfolio::list).post(portfolio::create))
        .route("/api/portfolio/:id", get(portfolio::get).put(portfolio::update).delete(portfolio::remove))
        .route("/api/payments", get(payments::list).post(payments::create))
        .route("/api/payments/summary", get(payments::summary))
        .route("/api/payments/:id", get(payments::get).delete(payments::remove))
        .route("/api/coupons", get(payments::list_coupons).post(payments::create_coupon))
        .route("/api/coupons/validate", post(payments::validate_coupon))
        .route("/api/coupons/:id", put(payments::update_coupon).delete(payments::delete_coupon))
        .route("/api/pricing/quote", post(payments::quote));

    let community: Router<AppState> = Router::new()
        .route("/api/networking/posts", get(social::list_posts).post(social::create_post))
        .route("/api/networking/posts/:id", delete(social::delete_post))
        .route("/api/networking/posts/:id/like", post(social::toggle_like))
        .route("/api/networking/posts/:id/comments", post(social::add_comment))
        .route("/api/networking/posts/:id/comments/:comment_id", delete(social::delete_comment))
        .route("/api/chats", get(social::list_chats))
        .route("/api/chats/messages", post(social::send_message))
        .route("/api/chats/:id", get(social::get_chat))
        .route("/api/chats/:id/read", post(social::mark_read))
        .route("/api/profiles/:user_id", get(social::get_profile).put(social::put_profile));

    let auth: Router<AppState> = Router::new()
        .route("/api/sessions", post(sessions::create))
        .route("/api/sessions/:id", get(sessions::status).delete(sessions::logout))
        .route("/api/sessions/:id/heartbeat", post(sessions::heartbeat))
        .route("/api/users/:user_id/sessions", get(sessions::list_for_user))
        .route("/api/users/:user_id/sessions/logout-all", post(sessions::logout_all));

    let automation: Router<AppState> = Router::new()
        .route("/api/bot/status", get(bot::status))
        .route("/api/bot/conversations", get(bot::conversations))
        .route("/api/bot/conversations/:user_id", delete(bot::reset_conversation))
        .route("/api/cron/reminders", post(cron::reminders))
        .route("/api/cron/promotions", post(cron::promotions))
        .route("/webhook/whatsapp", get(bot::verify_webhook).post(bot::receive_webhook));

    Router::new()
        .route("/health", get(dashboard::health))
        .merge(studio)
        .merge(community)
        .merge(auth)
        .merge(automation)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
