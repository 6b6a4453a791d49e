/// Server-side login sessions
///
/// The browser holds an opaque random token; only its SHA-256 digest is
/// stored. Role and verification flag are read from the user on every
/// resolution, so the row carries nothing but the user id and lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(skip_serializing, default)]
    pub token_hash: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn from_new(data: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            token_hash: data.token_hash,
            created_at: now,
            expires_at: data.expires_at,
        }
    }

    pub async fn create(pool: &PgPool, data: NewSession) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.token_hash)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await
    }

    /// Finds a live session; expired rows never resolve
    pub async fn find_live(
        pool: &PgPool,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete_by_token(pool: &PgPool, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ends every session of a user (password reset)
    pub async fn delete_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
