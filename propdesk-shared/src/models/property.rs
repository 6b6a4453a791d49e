/// Property and floor models
///
/// A property is owned by exactly one owner and optionally delegated to one
/// manager. Deleting a property cascades to its floors, appliances, issues and
/// open invitations (enforced by the foreign keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,

    /// Always a user with role = owner
    pub owner_id: Uuid,

    /// If set, always a user with role = manager
    pub manager_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,
    pub owner_id: Uuid,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Floor {
    pub id: Uuid,
    pub property_id: Uuid,

    /// Free-form label ("G", "1", "Mezzanine"); unique per property
    pub floor_number: String,

    /// Reference returned by the file store
    pub floor_plan: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFloor {
    pub property_id: Uuid,
    pub floor_number: String,
}

impl Property {
    pub async fn create(pool: &PgPool, data: NewProperty) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            r#"
            INSERT INTO properties (name, address, property_type, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.address)
        .bind(data.property_type)
        .bind(data.owner_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Properties a user owns or manages
    pub async fn list_operable_by(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            r#"
            SELECT * FROM properties
            WHERE owner_id = $1 OR manager_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: PropertyUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                property_type = COALESCE($4, property_type),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.address)
        .bind(data.property_type)
        .fetch_optional(pool)
        .await
    }

    /// Sets or clears the delegated manager
    ///
    /// The row only changes when the new manager really has role = manager,
    /// so a stale role check upstream cannot delegate to anyone else.
    pub async fn set_manager(
        pool: &PgPool,
        id: Uuid,
        manager_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
            SET manager_id = $2, updated_at = NOW()
            WHERE id = $1
              AND ($2::uuid IS NULL OR EXISTS (
                  SELECT 1 FROM users WHERE id = $2 AND role = 'manager'
              ))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(manager_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl Floor {
    pub async fn create(pool: &PgPool, data: NewFloor) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Floor>(
            r#"
            INSERT INTO floors (property_id, floor_number)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(data.property_id)
        .bind(data.floor_number)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Floor>("SELECT * FROM floors WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_property(pool: &PgPool, property_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Floor>(
            "SELECT * FROM floors WHERE property_id = $1 ORDER BY floor_number",
        )
        .bind(property_id)
        .fetch_all(pool)
        .await
    }

    pub async fn set_floor_plan(
        pool: &PgPool,
        id: Uuid,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Floor>(
            "UPDATE floors SET floor_plan = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(reference)
        .fetch_optional(pool)
        .await
    }

    pub async fn set_number(
        pool: &PgPool,
        id: Uuid,
        floor_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Floor>(
            "UPDATE floors SET floor_number = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(floor_number)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM floors WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
