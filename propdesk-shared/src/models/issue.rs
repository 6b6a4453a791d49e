/// Issue model and guarded state transitions
///
/// An issue is reported by a tenant against a property (and usually one of
/// its appliances) and then moves through the repair lifecycle:
///
/// ```text
/// pending      --assign-->       assigned
/// assigned     --accept-->       in_progress
/// assigned     --reject-->       pending
/// in_progress  --reject-->       pending
/// assigned     --submit bill-->  repaired
/// in_progress  --submit bill-->  repaired
/// repaired     --approve-->      paid
/// ```
///
/// Every transition is applied with a compare-and-set: the row only changes
/// if status, vendor and vendor-token digest are still what the caller loaded.
/// Two racing transitions on the same issue therefore never both apply.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE issues (
///     id UUID PRIMARY KEY,
///     property_id UUID NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
///     appliance_id UUID REFERENCES appliances(id) ON DELETE SET NULL,
///     tenant_id UUID NOT NULL REFERENCES users(id),
///     description TEXT NOT NULL,
///     status issue_status NOT NULL DEFAULT 'pending',
///     vendor_id UUID REFERENCES users(id),
///     vendor_token_hash VARCHAR(128),
///     bill_amount BIGINT,
///     repair_notes TEXT,
///     created_at, assigned_at, completed_at, paid_at, updated_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Repair lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "issue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Reported, waiting for a vendor
    Pending,

    /// Vendor chosen, not yet accepted
    Assigned,

    /// Vendor accepted and is working on it
    InProgress,

    /// Vendor submitted a bill
    Repaired,

    /// Bill approved; terminal
    Paid,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Assigned => "assigned",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Repaired => "repaired",
            IssueStatus::Paid => "paid",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Paid)
    }

    /// States in which a vendor holds the job (and a link token may exist)
    pub fn is_with_vendor(&self) -> bool {
        matches!(self, IssueStatus::Assigned | IssueStatus::InProgress)
    }

    /// Checks if moving to `target` is an edge of the lifecycle
    pub fn can_transition_to(&self, target: IssueStatus) -> bool {
        match (self, target) {
            (IssueStatus::Pending, IssueStatus::Assigned) => true,

            (IssueStatus::Assigned, IssueStatus::InProgress) => true,
            (IssueStatus::Assigned, IssueStatus::Pending) => true,
            (IssueStatus::Assigned, IssueStatus::Repaired) => true,

            (IssueStatus::InProgress, IssueStatus::Pending) => true,
            (IssueStatus::InProgress, IssueStatus::Repaired) => true,

            (IssueStatus::Repaired, IssueStatus::Paid) => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Issue {
    pub id: Uuid,
    pub property_id: Uuid,
    pub appliance_id: Option<Uuid>,

    /// Reporting tenant
    pub tenant_id: Uuid,

    pub description: String,
    pub status: IssueStatus,

    /// The one field naming the assigned vendor
    pub vendor_id: Option<Uuid>,

    /// Digest of the vendor-response link token.
    /// Non-null only while status is assigned or in_progress.
    #[serde(skip_serializing, default)]
    pub vendor_token_hash: Option<String>,

    /// Minor currency units
    pub bill_amount: Option<i64>,

    pub repair_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub property_id: Uuid,
    pub appliance_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub description: String,
}

/// Fields the lifecycle is allowed to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowFields {
    pub status: IssueStatus,
    pub vendor_id: Option<Uuid>,
    pub vendor_token_hash: Option<String>,
    pub bill_amount: Option<i64>,
    pub repair_notes: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// What the caller saw when it loaded the issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowGuard {
    pub status: IssueStatus,
    pub vendor_id: Option<Uuid>,
    pub vendor_token_hash: Option<String>,
}

/// Compare-and-set of the workflow fields of one issue
#[derive(Debug, Clone)]
pub struct IssueTransition {
    pub issue_id: Uuid,
    pub expected: WorkflowGuard,
    pub next: WorkflowFields,
}

impl Issue {
    pub fn from_new(data: NewIssue, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_id: data.property_id,
            appliance_id: data.appliance_id,
            tenant_id: data.tenant_id,
            description: data.description,
            status: IssueStatus::Pending,
            vendor_id: None,
            vendor_token_hash: None,
            bill_amount: None,
            repair_notes: None,
            created_at: now,
            assigned_at: None,
            completed_at: None,
            paid_at: None,
            updated_at: now,
        }
    }

    pub fn workflow_fields(&self) -> WorkflowFields {
        WorkflowFields {
            status: self.status,
            vendor_id: self.vendor_id,
            vendor_token_hash: self.vendor_token_hash.clone(),
            bill_amount: self.bill_amount,
            repair_notes: self.repair_notes.clone(),
            assigned_at: self.assigned_at,
            completed_at: self.completed_at,
            paid_at: self.paid_at,
        }
    }

    pub fn guard(&self) -> WorkflowGuard {
        WorkflowGuard {
            status: self.status,
            vendor_id: self.vendor_id,
            vendor_token_hash: self.vendor_token_hash.clone(),
        }
    }

    pub fn matches_guard(&self, guard: &WorkflowGuard) -> bool {
        self.status == guard.status
            && self.vendor_id == guard.vendor_id
            && self.vendor_token_hash == guard.vendor_token_hash
    }

    /// Writes workflow fields in memory
    pub fn apply_fields(&mut self, next: WorkflowFields, now: DateTime<Utc>) {
        self.status = next.status;
        self.vendor_id = next.vendor_id;
        self.vendor_token_hash = next.vendor_token_hash;
        self.bill_amount = next.bill_amount;
        self.repair_notes = next.repair_notes;
        self.assigned_at = next.assigned_at;
        self.completed_at = next.completed_at;
        self.paid_at = next.paid_at;
        self.updated_at = now;
    }

    pub async fn create(pool: &PgPool, data: NewIssue) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Issue>(
            r#"
            INSERT INTO issues (property_id, appliance_id, tenant_id, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.property_id)
        .bind(data.appliance_id)
        .bind(data.tenant_id)
        .bind(data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>("SELECT * FROM issues WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_properties(
        pool: &PgPool,
        property_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE property_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(property_ids)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE tenant_id = $1 ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_vendor(pool: &PgPool, vendor_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Issue>(
            "SELECT * FROM issues WHERE vendor_id = $1 ORDER BY created_at DESC",
        )
        .bind(vendor_id)
        .fetch_all(pool)
        .await
    }

    /// Applies a transition if the guard still holds
    ///
    /// Returns `None` when another request changed the issue first.
    pub async fn apply_transition(
        pool: &PgPool,
        transition: &IssueTransition,
    ) -> Result<Option<Self>, sqlx::Error> {
        let next = &transition.next;
        let expected = &transition.expected;

        sqlx::query_as::<_, Issue>(
            r#"
            UPDATE issues
            SET status = $5,
                vendor_id = $6,
                vendor_token_hash = $7,
                bill_amount = $8,
                repair_notes = $9,
                assigned_at = $10,
                completed_at = $11,
                paid_at = $12,
                updated_at = NOW()
            WHERE id = $1
              AND status = $2
              AND vendor_id IS NOT DISTINCT FROM $3
              AND vendor_token_hash IS NOT DISTINCT FROM $4
            RETURNING *
            "#,
        )
        .bind(transition.issue_id)
        .bind(expected.status)
        .bind(expected.vendor_id)
        .bind(expected.vendor_token_hash.as_deref())
        .bind(next.status)
        .bind(next.vendor_id)
        .bind(next.vendor_token_hash.as_deref())
        .bind(next.bill_amount)
        .bind(next.repair_notes.as_deref())
        .bind(next.assigned_at)
        .bind(next.completed_at)
        .bind(next.paid_at)
        .fetch_optional(pool)
        .await
    }
}
