//! Persistent SQLite store for the studio's records.
//!
//! Each entity family lives in its own submodule and adds an `impl Database`
//! block. Embedded arrays (post likes and comments, chat messages) are kept
//! as JSON columns on their parent row, mirroring the document layout the
//! front end expects.

pub mod appointments;
pub mod chats;
pub mod clients;
pub mod coupons;
pub mod dashboard;
pub mod inventory;
pub mod networking;
pub mod payments;
pub mod portfolio;
pub mod profiles;
pub mod sessions;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use tracing::info;

pub use appointments::{Appointment, AppointmentFilter, AppointmentInput, AppointmentStatus, ReminderTarget};
pub use chats::{ChatOverview, PrivateChat, PrivateMessage, SentMessage};
pub use clients::{Client, ClientInput};
pub use coupons::{Coupon, CouponEvaluation, CouponInput, CouponRejection, Discount};
pub use dashboard::DashboardStats;
pub use inventory::{InventoryItem, InventoryItemInput, MovementInput, MovementKind, StockMovement};
pub use networking::{Comment, CommentInput, NetworkingPost, PostInput};
pub use payments::{Payment, PaymentInput, PaymentMethod, PaymentSummary};
pub use portfolio::{PortfolioInput, PortfolioItem};
pub use profiles::{ProfileInput, UserProfile};
pub use sessions::UserSession;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("database lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

/// Persistent SQLite database for the studio.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn new() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;

        let clients = db.client_count()?;
        info!("Loaded database from {:?} ({} clients)", path, clients);
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                instagram TEXT,
                birth_date TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                client_name TEXT NOT NULL,
                artist TEXT,
                description TEXT NOT NULL DEFAULT '',
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                price_cents INTEGER,
                deposit_cents INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'scheduled',
                notes TEXT,
                reminder_sent_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS inventory_items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT,
                unit TEXT NOT NULL DEFAULT 'un',
                quantity INTEGER NOT NULL DEFAULT 0,
                min_quantity INTEGER NOT NULL DEFAULT 0,
                cost_cents INTEGER,
                supplier TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stock_movements (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                reason TEXT,
                resulting_quantity INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portfolio_items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                image_url TEXT NOT NULL,
                style TEXT,
                body_location TEXT,
                featured INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                client_id TEXT,
                appointment_id TEXT,
                amount_cents INTEGER NOT NULL,
                discount_cents INTEGER NOT NULL DEFAULT 0,
                coupon_code TEXT,
                method TEXT NOT NULL,
                paid_at TEXT NOT NULL,
                notes TEXT
            );

            CREATE TABLE IF NOT EXISTS coupons (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                code_key TEXT NOT NULL UNIQUE,
                description TEXT,
                discount_kind TEXT NOT NULL,
                discount_value INTEGER NOT NULL,
                max_uses INTEGER,
                uses INTEGER NOT NULL DEFAULT 0,
                valid_until TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS networking_posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                image_url TEXT,
                likes TEXT NOT NULL DEFAULT '[]',
                comments TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS private_chats (
                id TEXT PRIMARY KEY,
                participant_a TEXT NOT NULL,
                participant_b TEXT NOT NULL,
                messages TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                studio_name TEXT,
                bio TEXT,
                avatar_url TEXT,
                instagram TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                device_fingerprint TEXT NOT NULL,
                device_name TEXT NOT NULL,
                browser TEXT NOT NULL,
                os TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                ip TEXT,
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                valid INTEGER NOT NULL DEFAULT 1,
                invalidated_at TEXT,
                invalidation_reason TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_clients_name ON clients(name);
            CREATE INDEX IF NOT EXISTS idx_clients_phone ON clients(phone);
            CREATE INDEX IF NOT EXISTS idx_appointments_starts_at ON appointments(starts_at);
            CREATE INDEX IF NOT EXISTS idx_appointments_client ON appointments(client_id);
            CREATE INDEX IF NOT EXISTS idx_movements_item ON stock_movements(item_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_payments_paid_at ON payments(paid_at);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON networking_posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_chats_a ON private_chats(participant_a);
            CREATE INDEX IF NOT EXISTS idx_chats_b ON private_chats(participant_b);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON user_sessions(user_id, valid);
        "#)?;
        Ok(())
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Read a JSON-encoded column into `T`.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Trim an optional text field, mapping blank to `None`.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Largest money amount accepted anywhere: R$ 10.000.000,00.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000;

/// Reject amounts outside `0..=MAX_AMOUNT_CENTS`.
pub(crate) fn check_amount(cents: i64, field: &str) -> Result<i64, StoreError> {
    if cents < 0 {
        return Err(StoreError::Invalid(format!("{field} can't be negative")));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(StoreError::Invalid(format!("{field} can't exceed {MAX_AMOUNT_CENTS} cents")));
    }
    Ok(cents)
}

/// Trim a required text field, rejecting blank values.
pub(crate) fn required(value: &str, field: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::new().unwrap();
        db.init_schema().unwrap();
        assert_eq!(db.client_count().unwrap(), 0);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inkdesk.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_client(ClientInput::named("Ana")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.client_count().unwrap(), 1);
    }

    #[test]
    fn test_clean_and_required() {
        assert_eq!(clean(Some("  ".to_string())), None);
        assert_eq!(clean(Some(" x ".to_string())), Some("x".to_string()));
        assert!(required("   ", "name").is_err());
        assert_eq!(required(" Ana ", "name").unwrap(), "Ana");
    }
}
