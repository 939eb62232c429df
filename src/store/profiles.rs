//! User profiles.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::{Database, StoreError, clean, now, required};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub studio_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub instagram: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInput {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub studio_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
}

impl Database {
    pub fn get_profile(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, display_name, email, phone, studio_name, bio, avatar_url, instagram, updated_at
             FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    email: row.get(2)?,
                    phone: row.get(3)?,
                    studio_name: row.get(4)?,
                    bio: row.get(5)?,
                    avatar_url: row.get(6)?,
                    instagram: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("profile", user_id))
    }

    /// Create or replace the profile for `user_id`.
    pub fn upsert_profile(&self, user_id: &str, input: ProfileInput) -> Result<UserProfile, StoreError> {
        let user_id = required(user_id, "user_id")?;
        let profile = UserProfile {
            display_name: required(&input.display_name, "display_name")?,
            email: clean(input.email),
            phone: clean(input.phone),
            studio_name: clean(input.studio_name),
            bio: clean(input.bio),
            avatar_url: clean(input.avatar_url),
            instagram: clean(input.instagram).map(|i| i.trim_start_matches('@').to_string()),
            updated_at: now(),
            user_id,
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_profiles (user_id, display_name, email, phone, studio_name, bio, avatar_url, instagram, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name, email = excluded.email, phone = excluded.phone,
                studio_name = excluded.studio_name, bio = excluded.bio, avatar_url = excluded.avatar_url,
                instagram = excluded.instagram, updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.display_name,
                profile.email,
                profile.phone,
                profile.studio_name,
                profile.bio,
                profile.avatar_url,
                profile.instagram,
                profile.updated_at
            ],
        )?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_then_replaces() {
        let db = Database::new().unwrap();
        assert!(matches!(db.get_profile("u1").unwrap_err(), StoreError::NotFound { .. }));

        let created = db
            .upsert_profile(
                "u1",
                ProfileInput {
                    display_name: "Rafa Tattoo".to_string(),
                    instagram: Some("@rafa.tattoo".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(created.instagram.as_deref(), Some("rafa.tattoo"));

        let replaced = db
            .upsert_profile(
                "u1",
                ProfileInput {
                    display_name: "Rafa".to_string(),
                    bio: Some("Blackwork e fineline".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let loaded = db.get_profile("u1").unwrap();
        assert_eq!(loaded, replaced);
        assert_eq!(loaded.display_name, "Rafa");
        assert!(loaded.instagram.is_none());
    }

    #[test]
    fn test_display_name_required() {
        let db = Database::new().unwrap();
        let err = db.upsert_profile("u1", ProfileInput::default()).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
