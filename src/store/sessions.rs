//! Persisted login sessions, one row per device login.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use tracing::info;

use super::{Database, StoreError, new_id, now, required};
use crate::sessions::DeviceInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSession {
    pub id: String,
    pub user_id: String,
    pub device_fingerprint: String,
    pub device_name: String,
    pub browser: String,
    pub os: String,
    pub user_agent: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub valid: bool,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidation_reason: Option<String>,
}

const SESSION_COLUMNS: &str = "id, user_id, device_fingerprint, device_name, browser, os, user_agent, ip, \
     created_at, last_activity, valid, invalidated_at, invalidation_reason";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<UserSession> {
    Ok(UserSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        device_fingerprint: row.get(2)?,
        device_name: row.get(3)?,
        browser: row.get(4)?,
        os: row.get(5)?,
        user_agent: row.get(6)?,
        ip: row.get(7)?,
        created_at: row.get(8)?,
        last_activity: row.get(9)?,
        valid: row.get(10)?,
        invalidated_at: row.get(11)?,
        invalidation_reason: row.get(12)?,
    })
}

impl Database {
    /// Start a session for `user_id` on `device`. A still-valid session on
    /// the same device is invalidated with reason `replaced`.
    pub fn create_session(
        &self,
        user_id: &str,
        device: &DeviceInfo,
        ip: Option<&str>,
    ) -> Result<UserSession, StoreError> {
        let user_id = required(user_id, "user_id")?;
        let ts = now();
        let session = UserSession {
            id: new_id(),
            user_id,
            device_fingerprint: device.fingerprint.clone(),
            device_name: device.device_name.clone(),
            browser: device.browser.clone(),
            os: device.os.clone(),
            user_agent: device.user_agent.clone(),
            ip: ip.map(str::to_string),
            created_at: ts,
            last_activity: ts,
            valid: true,
            invalidated_at: None,
            invalidation_reason: None,
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let replaced = tx.execute(
            "UPDATE user_sessions SET valid = 0, invalidated_at = ?3, invalidation_reason = 'replaced'
             WHERE user_id = ?1 AND device_fingerprint = ?2 AND valid = 1",
            params![session.user_id, session.device_fingerprint, ts],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO user_sessions ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, NULL, NULL)"
            ),
            params![
                session.id,
                session.user_id,
                session.device_fingerprint,
                session.device_name,
                session.browser,
                session.os,
                session.user_agent,
                session.ip,
                session.created_at,
                session.last_activity
            ],
        )?;
        tx.commit()?;
        info!(
            "New session {} for {} on {} ({} replaced)",
            session.id, session.user_id, session.device_name, replaced
        );
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<UserSession, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE id = ?1"),
            params![id],
            session_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("session", id))
    }

    /// Refresh `last_activity` of a valid session. Returns `false` when the
    /// session has already been invalidated.
    pub fn touch_session(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE user_sessions SET last_activity = MAX(last_activity, ?2) WHERE id = ?1 AND valid = 1",
            params![id, at],
        )?;
        Ok(changed > 0)
    }

    /// Invalidate one session. Returns `false` if it was already invalid.
    pub fn invalidate_session(&self, id: &str, reason: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE user_sessions SET valid = 0, invalidated_at = ?2, invalidation_reason = ?3
             WHERE id = ?1 AND valid = 1",
            params![id, now(), reason],
        )?;
        if changed == 0 {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM user_sessions WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::not_found("session", id));
            }
        }
        Ok(changed > 0)
    }

    /// Invalidate every valid session of `user_id`, optionally keeping `except`.
    pub fn invalidate_all_sessions(
        &self,
        user_id: &str,
        except: Option<&str>,
        reason: &str,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE user_sessions SET valid = 0, invalidated_at = ?3, invalidation_reason = ?4
             WHERE user_id = ?1 AND valid = 1 AND (?2 IS NULL OR id != ?2)",
            params![user_id, except, now(), reason],
        )?;
        info!("Invalidated {} session(s) for {} ({})", changed, user_id, reason);
        Ok(changed)
    }

    /// Sessions of a user, most recently active first.
    pub fn list_sessions(&self, user_id: &str, valid_only: bool) -> Result<Vec<UserSession>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions
             WHERE user_id = ?1 AND (?2 = 0 OR valid = 1)
             ORDER BY last_activity DESC"
        ))?;
        let sessions = stmt
            .query_map(params![user_id, valid_only], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Invalidate valid sessions with no activity since `cutoff`.
    pub fn expire_idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE user_sessions SET valid = 0, invalidated_at = ?2, invalidation_reason = 'idle'
             WHERE valid = 1 AND last_activity < ?1",
            params![cutoff, now()],
        )?;
        Ok(changed)
    }
}
