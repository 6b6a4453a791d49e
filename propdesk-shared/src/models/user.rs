/// User model and database operations
///
/// A user is an owner, manager, tenant or vendor. Tenants additionally carry
/// an assignment (property, optional floor, flat and room) which scopes what
/// they may see and report against.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username VARCHAR(255) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(255),
///     phone VARCHAR(50),
///     service_type VARCHAR(100),
///     password_hash VARCHAR(255) NOT NULL,
///     role user_role NOT NULL,
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     otp_hash VARCHAR(128),
///     otp_expires_at TIMESTAMPTZ,
///     property_id UUID, floor_id UUID,
///     flat_no VARCHAR(50), room_no VARCHAR(50),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use propdesk_shared::models::user::{NewUser, Role, User};
/// use propdesk_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let owner = User::create(&pool, NewUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     role: Role::Owner,
///     ..NewUser::default()
/// }).await?;
///
/// let found = User::find_by_email(&pool, "alice@example.com").await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Closed set of roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns properties and everything under them
    Owner,

    /// Operates properties delegated by an owner
    Manager,

    /// Lives in an assigned property and reports issues
    Tenant,

    /// Repairs issues assigned to them and bills for the work
    Vendor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Tenant => "tenant",
            Role::Vendor => "vendor",
        }
    }

    /// Whether login requires a confirmed email address
    pub fn requires_verification(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Role::Owner),
            "manager" => Some(Role::Manager),
            "tenant" => Some(Role::Tenant),
            "vendor" => Some(Role::Vendor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account
///
/// Secrets (password hash, OTP digest) are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub username: String,

    /// Stored lowercased
    pub email: String,

    pub name: Option<String>,

    pub phone: Option<String>,

    /// Trade of a vendor (plumber, electrician, ...)
    pub service_type: Option<String>,

    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub role: Role,

    pub is_verified: bool,

    /// HMAC digest of the outstanding one-time code.
    /// Set together with `otp_expires_at` or not at all.
    #[serde(skip_serializing, default)]
    pub otp_hash: Option<String>,

    #[serde(skip_serializing, default)]
    pub otp_expires_at: Option<DateTime<Utc>>,

    pub property_id: Option<Uuid>,

    pub floor_id: Option<Uuid>,

    pub flat_no: Option<String>,

    pub room_no: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Where a tenant lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAssignment {
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,
    pub flat_no: Option<String>,
    pub room_no: Option<String>,
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub service_type: Option<String>,

    /// Argon2id hash, never plaintext
    pub password_hash: String,

    pub role: Role,
    pub is_verified: bool,
    pub assignment: Option<TenantAssignment>,
}

impl Default for NewUser {
    fn default() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            name: None,
            phone: None,
            service_type: None,
            password_hash: String::new(),
            role: Role::Tenant,
            is_verified: false,
            assignment: None,
        }
    }
}

impl User {
    /// Builds an in-memory user record from creation input
    pub fn from_new(data: NewUser, now: DateTime<Utc>) -> Self {
        let assignment = data.assignment.unwrap_or_default();
        let assigned = !assignment.property_id.is_nil();

        Self {
            id: Uuid::new_v4(),
            username: data.username,
            email: data.email,
            name: data.name,
            phone: data.phone,
            service_type: data.service_type,
            password_hash: data.password_hash,
            role: data.role,
            is_verified: data.is_verified,
            otp_hash: None,
            otp_expires_at: None,
            property_id: assigned.then_some(assignment.property_id),
            floor_id: assignment.floor_id,
            flat_no: assignment.flat_no,
            room_no: assignment.room_no,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create(pool: &PgPool, data: NewUser) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::create_with(&mut *conn, data).await
    }

    /// Inserts a user on an existing connection or transaction
    pub async fn create_with(
        conn: &mut sqlx::PgConnection,
        data: NewUser,
    ) -> Result<Self, sqlx::Error> {
        let assignment = data.assignment.unwrap_or_default();
        let property_id = (!assignment.property_id.is_nil()).then_some(assignment.property_id);

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, name, phone, service_type, password_hash,
                               role, is_verified, property_id, floor_id, flat_no, room_no)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(data.username)
        .bind(data.email)
        .bind(data.name)
        .bind(data.phone)
        .bind(data.service_type)
        .bind(data.password_hash)
        .bind(data.role)
        .bind(data.is_verified)
        .bind(property_id)
        .bind(assignment.floor_id)
        .bind(assignment.flat_no)
        .bind(assignment.room_no)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by username or email, whichever matches
    pub async fn find_by_login(pool: &PgPool, login: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR email = LOWER($1) LIMIT 1",
        )
        .bind(login)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_role(pool: &PgPool, role: Role) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = $1 ORDER BY username")
            .bind(role)
            .fetch_all(pool)
            .await
    }

    /// Replaces any outstanding one-time code
    pub async fn set_otp(
        pool: &PgPool,
        id: Uuid,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET otp_hash = $2, otp_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(otp_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Check-and-clear of the one-time code in a single statement
    ///
    /// Only one of any number of concurrent callers presenting the right code
    /// sees `true`. A wrong or expired code leaves the stored code untouched.
    pub async fn consume_otp(
        pool: &PgPool,
        id: Uuid,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET otp_hash = NULL, otp_expires_at = NULL, updated_at = NOW()
            WHERE id = $1 AND otp_hash = $2 AND otp_expires_at >= $3
            "#,
        )
        .bind(id)
        .bind(otp_hash)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_verified(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a tenant into a property (only rows with role = tenant match)
    pub async fn assign_tenant(
        pool: &PgPool,
        id: Uuid,
        assignment: TenantAssignment,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET property_id = $2, floor_id = $3, flat_no = $4, room_no = $5, updated_at = NOW()
            WHERE id = $1 AND role = 'tenant'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(assignment.property_id)
        .bind(assignment.floor_id)
        .bind(assignment.flat_no)
        .bind(assignment.room_no)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a user unless they still own or manage a property
    ///
    /// Returns `None` when the user does not exist, `Some(false)` when the
    /// delete was refused.
    pub async fn delete_unreferenced(pool: &PgPool, id: Uuid) -> Result<Option<bool>, sqlx::Error> {
        // The activated invitation goes with the account so the email can be invited again
        let deleted: i64 = sqlx::query_scalar(
            r#"
            WITH removed AS (
                DELETE FROM users
                WHERE id = $1
                  AND NOT EXISTS (
                      SELECT 1 FROM properties WHERE owner_id = $1 OR manager_id = $1
                  )
                RETURNING email
            ), released AS (
                DELETE FROM pending_tenants
                WHERE email IN (SELECT LOWER(email) FROM removed)
            )
            SELECT COUNT(*) FROM removed
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        if deleted == 1 {
            return Ok(Some(true));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;

        Ok(exists.then_some(false))
    }
}
