//! inkdesk: back end for a tattoo studio. Client records, the artists'
//! agenda, stock, payments and coupons, a WhatsApp auto-reply bot and the
//! scheduled reminder and promotion jobs.

pub mod alert_log;
pub mod api;
pub mod bot;
pub mod config;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod pricing;
pub mod scheduler;
pub mod sessions;
pub mod store;
pub mod text;
