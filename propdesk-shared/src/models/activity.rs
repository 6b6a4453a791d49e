/// Activity log entries shown on the owner dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub action: String,
}

impl ActivityLog {
    pub fn from_new(data: NewActivity, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            property_id: data.property_id,
            action: data.action,
            created_at: now,
        }
    }

    pub async fn record(pool: &PgPool, data: NewActivity) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (user_id, property_id, action)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.property_id)
        .bind(data.action)
        .fetch_one(pool)
        .await
    }

    pub async fn recent_for_properties(
        pool: &PgPool,
        property_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT * FROM activity_logs
            WHERE property_id = ANY($1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(property_ids)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
