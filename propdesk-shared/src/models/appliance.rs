/// Appliance model
///
/// Appliances belong to a property and optionally to one of its floors.
/// Tenants report issues against them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Days before expiry at which a warranty is flagged
pub const WARRANTY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appliance {
    pub id: Uuid,
    pub property_id: Uuid,

    /// `None` means property-wide (boiler room, lift, ...)
    pub floor_id: Option<Uuid>,

    pub created_by: Uuid,
    pub name: String,
    pub model: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub warranty_expiry: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppliance {
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,
    pub created_by: Uuid,
    pub name: String,
    pub model: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub warranty_expiry: Option<NaiveDate>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplianceUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub warranty_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyStatus {
    Valid,
    ExpiringSoon,
    Expired,
    Unknown,
}

impl Appliance {
    pub fn warranty_status(&self, today: NaiveDate) -> WarrantyStatus {
        match self.warranty_expiry {
            None => WarrantyStatus::Unknown,
            Some(expiry) if expiry < today => WarrantyStatus::Expired,
            Some(expiry) if expiry <= today + Duration::days(WARRANTY_WARNING_DAYS) => {
                WarrantyStatus::ExpiringSoon
            }
            Some(_) => WarrantyStatus::Valid,
        }
    }

    /// Applies a partial update in memory
    pub fn apply(&mut self, update: ApplianceUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if update.model.is_some() {
            self.model = update.model;
        }
        if update.color.is_some() {
            self.color = update.color;
        }
        if update.status.is_some() {
            self.status = update.status;
        }
        if update.location.is_some() {
            self.location = update.location;
        }
        if update.warranty_expiry.is_some() {
            self.warranty_expiry = update.warranty_expiry;
        }
        self.updated_at = now;
    }

    pub async fn create(pool: &PgPool, data: NewAppliance) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Appliance>(
            r#"
            INSERT INTO appliances (property_id, floor_id, created_by, name, model, color,
                                    status, location, warranty_expiry)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.property_id)
        .bind(data.floor_id)
        .bind(data.created_by)
        .bind(data.name)
        .bind(data.model)
        .bind(data.color)
        .bind(data.status)
        .bind(data.location)
        .bind(data.warranty_expiry)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appliance>("SELECT * FROM appliances WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_property(pool: &PgPool, property_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appliance>(
            "SELECT * FROM appliances WHERE property_id = $1 ORDER BY name",
        )
        .bind(property_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: ApplianceUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Appliance>(
            r#"
            UPDATE appliances
            SET name = COALESCE($2, name),
                model = COALESCE($3, model),
                color = COALESCE($4, color),
                status = COALESCE($5, status),
                location = COALESCE($6, location),
                warranty_expiry = COALESCE($7, warranty_expiry),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.model)
        .bind(data.color)
        .bind(data.status)
        .bind(data.location)
        .bind(data.warranty_expiry)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM appliances WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
