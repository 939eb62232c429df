//! Multi-device session tracking: device detection, validity and heartbeats.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{MAX_IDLE_TIMEOUT_HOURS, SessionConfig};
use crate::store::{Database, StoreError, UserSession};

/// Device metadata for a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub fingerprint: String,
    pub device_name: String,
    pub browser: String,
    pub os: String,
    pub user_agent: String,
}

/// Work out browser, OS and a device label from a User-Agent header.
/// Without a client-supplied fingerprint the fingerprint is `browser|os`.
pub fn parse_user_agent(user_agent: &str, fingerprint: Option<&str>) -> DeviceInfo {
    let ua = user_agent.to_lowercase();

    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari
    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else {
        "Unknown"
    };

    let os = if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    };

    let kind = if ua.contains("ipad") || ua.contains("tablet") {
        "Tablet"
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        "Mobile"
    } else {
        "Desktop"
    };

    let fingerprint = fingerprint
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{browser}|{os}"));

    DeviceInfo {
        fingerprint,
        device_name: format!("{browser} on {os} ({kind})"),
        browser: browser.to_string(),
        os: os.to_string(),
        user_agent: user_agent.to_string(),
    }
}

/// Answer to a validity poll or heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SessionStatus {
    fn valid(id: &str) -> Self {
        Self { session_id: id.to_string(), valid: true, reason: None }
    }

    fn invalid(id: &str, reason: impl Into<String>) -> Self {
        Self { session_id: id.to_string(), valid: false, reason: Some(reason.into()) }
    }
}

/// Validity rules shared by the API and the sweeper.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub idle_timeout: Duration,
    pub heartbeat_interval_secs: u64,
    pub validity_check_interval_secs: u64,
}

impl SessionPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            idle_timeout: Duration::hours(config.idle_timeout_hours.clamp(1, MAX_IDLE_TIMEOUT_HOURS)),
            heartbeat_interval_secs: config.heartbeat_interval_secs,
            validity_check_interval_secs: config.validity_check_interval_secs,
        }
    }

    /// A session is valid while its flag is set and it has been active within the idle timeout.
    pub fn status(&self, session: &UserSession, at: DateTime<Utc>) -> SessionStatus {
        if !session.valid {
            let reason = session.invalidation_reason.as_deref().unwrap_or("invalidated");
            return SessionStatus::invalid(&session.id, reason);
        }
        if at - session.last_activity > self.idle_timeout {
            return SessionStatus::invalid(&session.id, "idle");
        }
        SessionStatus::valid(&session.id)
    }

    pub fn session_status(&self, db: &Database, id: &str, at: DateTime<Utc>) -> Result<SessionStatus, StoreError> {
        match db.get_session(id) {
            Ok(session) => Ok(self.status(&session, at)),
            Err(StoreError::NotFound { .. }) => Ok(SessionStatus::invalid(id, "unknown")),
            Err(e) => Err(e),
        }
    }

    /// Refresh a session's activity. Idle sessions are invalidated instead
    /// so every device sees the same answer on its next poll.
    pub fn heartbeat(&self, db: &Database, id: &str, at: DateTime<Utc>) -> Result<SessionStatus, StoreError> {
        let status = self.session_status(db, id, at)?;
        if !status.valid {
            if status.reason.as_deref() == Some("idle") {
                db.invalidate_session(id, "idle")?;
            }
            return Ok(status);
        }
        if !db.touch_session(id, at)? {
            // Invalidated between the read and the write
            return self.session_status(db, id, at);
        }
        Ok(status)
    }

    pub fn list_active_sessions(&self, db: &Database, user_id: &str, at: DateTime<Utc>) -> Result<Vec<UserSession>, StoreError> {
        let sessions = db
            .list_sessions(user_id, true)?
            .into_iter()
            .filter(|s| self.status(s, at).valid)
            .collect();
        Ok(sessions)
    }

    pub fn expire_idle(&self, db: &Database, at: DateTime<Utc>) -> Result<usize, StoreError> {
        db.expire_idle_sessions(at - self.idle_timeout)
    }
}

/// Periodically invalidate sessions that went idle.
pub fn spawn_sweeper(db: Arc<Database>, policy: SessionPolicy, every: StdDuration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // A zero period would panic inside the task
        let mut interval = tokio::time::interval(every.max(StdDuration::from_secs(1)));
        loop {
            interval.tick().await;
            match policy.expire_idle(&db, Utc::now()) {
                Ok(0) => {}
                Ok(n) => info!("Expired {} idle session(s)", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const EDGE_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 Edg/120.0";
    const SAFARI_IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const FIREFOX_ANDROID: &str = "Mozilla/5.0 (Android 14; Mobile; rv:121.0) Gecko/121.0 Firefox/121.0";

    fn policy() -> SessionPolicy {
        SessionPolicy::from_config(&SessionConfig::default())
    }

    #[test]
    fn test_parse_user_agents() {
        let chrome = parse_user_agent(CHROME_WINDOWS, None);
        assert_eq!((chrome.browser.as_str(), chrome.os.as_str()), ("Chrome", "Windows"));
        assert_eq!(chrome.device_name, "Chrome on Windows (Desktop)");
        assert_eq!(chrome.fingerprint, "Chrome|Windows");

        assert_eq!(parse_user_agent(EDGE_WINDOWS, None).browser, "Edge");

        let iphone = parse_user_agent(SAFARI_IPHONE, None);
        assert_eq!((iphone.browser.as_str(), iphone.os.as_str()), ("Safari", "iOS"));
        assert!(iphone.device_name.ends_with("(Mobile)"));

        let android = parse_user_agent(FIREFOX_ANDROID, Some(" fp-123 "));
        assert_eq!((android.browser.as_str(), android.os.as_str()), ("Firefox", "Android"));
        assert_eq!(android.fingerprint, "fp-123");
    }

    #[test]
    fn test_status_rules() {
        let db = Database::new().unwrap();
        let s = db.create_session("u1", &parse_user_agent(CHROME_WINDOWS, None), None).unwrap();
        let p = policy();

        assert!(p.status(&s, s.last_activity + Duration::hours(71)).valid);
        let idle = p.status(&s, s.last_activity + Duration::hours(73));
        assert!(!idle.valid);
        assert_eq!(idle.reason.as_deref(), Some("idle"));

        db.invalidate_session(&s.id, "logout").unwrap();
        let status = p.session_status(&db, &s.id, s.last_activity).unwrap();
        assert_eq!(status.reason.as_deref(), Some("logout"));

        let unknown = p.session_status(&db, "nope", s.last_activity).unwrap();
        assert_eq!(unknown.reason.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_heartbeat_refreshes_and_expires() {
        let db = Database::new().unwrap();
        let s = db.create_session("u1", &parse_user_agent(CHROME_WINDOWS, None), None).unwrap();
        let p = policy();

        let soon = s.last_activity + Duration::hours(48);
        assert!(p.heartbeat(&db, &s.id, soon).unwrap().valid);
        assert_eq!(db.get_session(&s.id).unwrap().last_activity, soon);

        // 48h later still within 72h of the refreshed activity
        assert!(p.heartbeat(&db, &s.id, soon + Duration::hours(48)).unwrap().valid);

        let much_later = soon + Duration::hours(200);
        let status = p.heartbeat(&db, &s.id, much_later).unwrap();
        assert!(!status.valid);
        let stored = db.get_session(&s.id).unwrap();
        assert!(!stored.valid);
        assert_eq!(stored.invalidation_reason.as_deref(), Some("idle"));
    }

    #[test]
    fn test_replaced_session_fails_heartbeat() {
        let db = Database::new().unwrap();
        let device = parse_user_agent(SAFARI_IPHONE, None);
        let old = db.create_session("u1", &device, None).unwrap();
        db.create_session("u1", &device, None).unwrap();
        let status = policy().heartbeat(&db, &old.id, Utc::now()).unwrap();
        assert!(!status.valid);
        assert_eq!(status.reason.as_deref(), Some("replaced"));
    }

    #[test]
    fn test_active_sessions_skip_idle() {
        let db = Database::new().unwrap();
        let s = db.create_session("u1", &parse_user_agent(CHROME_WINDOWS, None), None).unwrap();
        let p = policy();
        assert_eq!(p.list_active_sessions(&db, "u1", s.last_activity).unwrap().len(), 1);
        assert!(p.list_active_sessions(&db, "u1", s.last_activity + Duration::days(4)).unwrap().is_empty());
        assert_eq!(p.expire_idle(&db, s.last_activity + Duration::days(4)).unwrap(), 1);
    }

    #[test]
    fn test_out_of_range_idle_timeout_is_clamped() {
        let huge = SessionConfig { idle_timeout_hours: i64::MAX, ..SessionConfig::default() };
        assert_eq!(SessionPolicy::from_config(&huge).idle_timeout, Duration::hours(MAX_IDLE_TIMEOUT_HOURS));

        let negative = SessionConfig { idle_timeout_hours: -5, ..SessionConfig::default() };
        let p = SessionPolicy::from_config(&negative);
        assert_eq!(p.idle_timeout, Duration::hours(1));

        let db = Database::new().unwrap();
        let s = db.create_session("u1", &parse_user_agent(CHROME_WINDOWS, None), None).unwrap();
        assert!(p.status(&s, s.last_activity + Duration::minutes(30)).valid);
        assert!(!p.status(&s, s.last_activity + Duration::minutes(90)).valid);
    }

    #[tokio::test]
    async fn test_sweeper_survives_zero_interval() {
        let db = Arc::new(Database::new().unwrap());
        let handle = spawn_sweeper(db, policy(), StdDuration::ZERO);
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
