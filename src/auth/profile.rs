//! User profile database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// Avatars offered during onboarding
pub const AVATARS: [&str; 4] = [
    "/avatars/astronaut.png",
    "/avatars/alien.png",
    "/avatars/nebula.png",
    "/avatars/robot.png",
];

/// User profile record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

/// Onboarding / profile edit request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Trimmed username, 2 to 32 characters
    pub fn validated_username(&self) -> Result<String> {
        let username = self.username.trim();
        let len = username.chars().count();
        if len < 2 || len > 32 {
            return Err(AppError::BadRequest(
                "Username must be between 2 and 32 characters".to_string(),
            ));
        }
        Ok(username.to_string())
    }
}

/// Profile repository
pub struct ProfileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT uid, username, avatar_url, created_at FROM user_profiles WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(self.pool)
        .await?;

        Ok(profile)
    }

    /// Create or update a profile; `created_at` is kept on update
    pub async fn upsert(&self, uid: &str, update: &ProfileUpdate) -> Result<UserProfile> {
        let username = update.validated_username()?;
        let avatar_url = update
            .avatar_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO user_profiles (uid, username, avatar_url, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                username = excluded.username,
                avatar_url = excluded.avatar_url
            "#,
        )
        .bind(uid)
        .bind(&username)
        .bind(avatar_url)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(uid)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch upserted profile".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = ProfileRepository::new(&pool);

        let first = repo
            .upsert(
                "u1",
                &ProfileUpdate {
                    username: "  Nova ".to_string(),
                    avatar_url: Some(AVATARS[2].to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(first.username, "Nova");

        let second = repo
            .upsert(
                "u1",
                &ProfileUpdate {
                    username: "Orion".to_string(),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.username, "Orion");
        assert_eq!(second.avatar_url, None);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_username_bounds() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = ProfileRepository::new(&pool);

        let long = "x".repeat(33);
        for name in ["a", " ", long.as_str()] {
            let err = repo
                .upsert("u1", &ProfileUpdate { username: name.to_string(), avatar_url: None })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
        assert!(repo.get("u1").await.unwrap().is_none());
    }
}
