/// Issue workflow
///
/// Drives an issue through its lifecycle. Every transition follows the same
/// steps:
///
/// 1. load the issue and resolve its property scope
/// 2. authorize the actor for this issue (session path) or check the vendor
///    token for this issue (link path)
/// 3. plan the field writes for the requested edge, refusing illegal
///    predecessors with [`CoreError::IllegalStateTransition`]
/// 4. apply them with a compare-and-set on status, vendor and token digest
/// 5. log activity and send notifications, neither of which can undo step 4
///
/// A compare-and-set miss means another request won the race. The session
/// path re-checks against the fresh row so the caller gets the precise
/// reason; the link path answers "invalid or expired", since the token it
/// presented is no longer the live one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::authorization::{authorize, authorize_vendor_link, Action, Actor};
use crate::auth::credentials::CredentialEngine;
use crate::auth::session::VendorCapability;
use crate::email::{deliver, messages, EmailMessage, EmailSender, LinkBuilder};
use crate::error::{CoreError, CoreResult, DenyReason};
use crate::hierarchy::Hierarchy;
use crate::models::{
    activity::NewActivity,
    issue::{Issue, IssueStatus, IssueTransition, NewIssue, WorkflowFields},
    user::Role,
};
use crate::store::Store;

pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// A requested lifecycle edge with its inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Assign { vendor_id: Uuid, token_digest: String },
    Accept,
    Reject,
    SubmitBill { amount: i64, notes: Option<String> },
    Approve,
}

impl Transition {
    pub fn action(&self) -> Action {
        match self {
            Transition::Assign { .. } => Action::AssignVendor,
            Transition::Accept => Action::AcceptJob,
            Transition::Reject => Action::RejectJob,
            Transition::SubmitBill { .. } => Action::SubmitBill,
            Transition::Approve => Action::ApproveBill,
        }
    }

    pub fn target(&self) -> IssueStatus {
        match self {
            Transition::Assign { .. } => IssueStatus::Assigned,
            Transition::Accept => IssueStatus::InProgress,
            Transition::Reject => IssueStatus::Pending,
            Transition::SubmitBill { .. } => IssueStatus::Repaired,
            Transition::Approve => IssueStatus::Paid,
        }
    }

    /// Edges that exist in the lifecycle but belong to another event are
    /// still illegal for this one (e.g. accepting from `in_progress`)
    fn legal_from(&self, status: IssueStatus) -> bool {
        let from = match self {
            Transition::Assign { .. } => matches!(status, IssueStatus::Pending),
            Transition::Accept => matches!(status, IssueStatus::Assigned),
            Transition::Reject | Transition::SubmitBill { .. } => status.is_with_vendor(),
            Transition::Approve => matches!(status, IssueStatus::Repaired),
        };
        from && status.can_transition_to(self.target())
    }
}

/// What a vendor may do through the response link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VendorResponse {
    Accept,
    Reject,
    Bill {
        bill_amount: i64,
        repair_notes: Option<String>,
    },
}

impl VendorResponse {
    fn into_transition(self) -> Transition {
        match self {
            VendorResponse::Accept => Transition::Accept,
            VendorResponse::Reject => Transition::Reject,
            VendorResponse::Bill {
                bill_amount,
                repair_notes,
            } => Transition::SubmitBill {
                amount: bill_amount,
                notes: repair_notes,
            },
        }
    }
}

/// Computes the workflow fields after `transition`, or refuses it
pub fn plan_transition(
    issue: &Issue,
    transition: &Transition,
    now: DateTime<Utc>,
) -> CoreResult<WorkflowFields> {
    if let Transition::SubmitBill { amount, .. } = transition {
        if *amount <= 0 {
            return Err(CoreError::Validation("bill amount must be positive".into()));
        }
    }

    if !transition.legal_from(issue.status) {
        return Err(CoreError::IllegalStateTransition {
            status: issue.status,
            action: transition.action().as_str(),
        });
    }

    let current = issue.workflow_fields();
    let next = match transition {
        Transition::Assign {
            vendor_id,
            token_digest,
        } => WorkflowFields {
            status: IssueStatus::Assigned,
            vendor_id: Some(*vendor_id),
            vendor_token_hash: Some(token_digest.clone()),
            bill_amount: None,
            repair_notes: None,
            assigned_at: Some(now),
            completed_at: None,
            paid_at: None,
        },
        Transition::Accept => WorkflowFields {
            status: IssueStatus::InProgress,
            ..current
        },
        Transition::Reject => WorkflowFields {
            status: IssueStatus::Pending,
            vendor_id: None,
            vendor_token_hash: None,
            assigned_at: None,
            ..current
        },
        Transition::SubmitBill { amount, notes } => WorkflowFields {
            status: IssueStatus::Repaired,
            vendor_token_hash: None,
            bill_amount: Some(*amount),
            repair_notes: notes.clone(),
            completed_at: Some(now),
            ..current
        },
        Transition::Approve => WorkflowFields {
            status: IssueStatus::Paid,
            paid_at: Some(now),
            ..current
        },
    };

    Ok(next)
}

/// Result of assigning a vendor; the raw token exists only here and in the email
#[derive(Debug, Clone)]
pub struct Assignment {
    pub issue: Issue,
    pub vendor_token: String,
    pub link: String,
}

pub struct IssueWorkflow {
    store: Arc<dyn Store>,
    credentials: Arc<CredentialEngine>,
    mailer: Arc<dyn EmailSender>,
    links: LinkBuilder,
}

impl IssueWorkflow {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<CredentialEngine>,
        mailer: Arc<dyn EmailSender>,
        links: LinkBuilder,
    ) -> Self {
        Self {
            store,
            credentials,
            mailer,
            links,
        }
    }

    fn hierarchy(&self) -> Hierarchy<'_> {
        Hierarchy::new(self.store.as_ref())
    }

    /// Tenant reports a problem with an appliance they can see
    pub async fn report(
        &self,
        actor: &Actor,
        appliance_id: Uuid,
        description: &str,
    ) -> CoreResult<Issue> {
        let description = description.trim();
        if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(CoreError::Validation(format!(
                "description must be 1 to {} characters",
                MAX_DESCRIPTION_LENGTH
            )));
        }

        let (appliance, resource) = self.hierarchy().appliance(appliance_id).await?;
        authorize(actor, Action::ReportIssue, &resource)?;

        let issue = self
            .store
            .create_issue(NewIssue {
                property_id: appliance.property_id,
                appliance_id: Some(appliance.id),
                tenant_id: actor.user_id,
                description: description.to_string(),
            })
            .await?;

        tracing::info!(
            issue_id = %issue.id,
            property_id = %issue.property_id,
            tenant_id = %actor.user_id,
            "Issue reported"
        );
        self.record(Some(actor.user_id), issue.property_id, format!("Issue reported: {}", appliance.name))
            .await;

        if let Some((to, property)) = self.responsible_contact(issue.property_id).await {
            self.notify(messages::issue_reported(&to, &property, &issue.description)).await;
        }

        Ok(issue)
    }

    pub async fn view(&self, actor: &Actor, issue_id: Uuid) -> CoreResult<Issue> {
        let (issue, resource) = self.hierarchy().issue(issue_id).await?;
        authorize(actor, Action::View, &resource)?;
        Ok(issue)
    }

    /// Issues the actor is entitled to see, newest first
    pub async fn list(&self, actor: &Actor) -> CoreResult<Vec<Issue>> {
        if actor.role.requires_verification() && !actor.verified {
            return Err(CoreError::Forbidden(DenyReason::Unverified));
        }

        let issues = match actor.role {
            Role::Owner | Role::Manager => {
                let ids = self.hierarchy().operable_property_ids(actor.user_id).await?;
                if ids.is_empty() {
                    Vec::new()
                } else {
                    self.store.list_issues_for_properties(&ids).await?
                }
            }
            Role::Tenant => self.store.list_issues_by_tenant(actor.user_id).await?,
            Role::Vendor => self.store.list_issues_by_vendor(actor.user_id).await?,
        };
        Ok(issues)
    }

    /// Owner or manager hands a pending issue to a vendor
    ///
    /// Issues a fresh vendor-link token and emails the link to the vendor.
    pub async fn assign_vendor(
        &self,
        actor: &Actor,
        issue_id: Uuid,
        vendor_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<Assignment> {
        let (issue, resource) = self.hierarchy().issue(issue_id).await?;
        authorize(actor, Action::AssignVendor, &resource)?;

        let vendor = self
            .store
            .find_user(vendor_id)
            .await?
            .filter(|u| u.role == Role::Vendor)
            .ok_or_else(|| CoreError::Validation("assignee must be a vendor".into()))?;

        let token = self.credentials.issue_vendor_token(issue.id);
        let transition = Transition::Assign {
            vendor_id: vendor.id,
            token_digest: token.digest,
        };
        let updated = self.commit_for_actor(actor, &issue, &transition, now).await?;

        tracing::info!(issue_id = %issue.id, vendor_id = %vendor.id, by = %actor.user_id, "Vendor assigned");
        self.record(
            Some(actor.user_id),
            updated.property_id,
            format!("Vendor {} assigned", vendor.username),
        )
        .await;

        let link = self.links.vendor_response(updated.id, &token.raw);
        let property = self.property_name(updated.property_id).await;
        self.notify(messages::vendor_assignment(&vendor.email, &property, &updated.description, &link))
            .await;

        Ok(Assignment {
            issue: updated,
            vendor_token: token.raw,
            link,
        })
    }

    pub async fn accept(&self, actor: &Actor, issue_id: Uuid, now: DateTime<Utc>) -> CoreResult<Issue> {
        self.transition_as(actor, issue_id, Transition::Accept, now).await
    }

    pub async fn reject(&self, actor: &Actor, issue_id: Uuid, now: DateTime<Utc>) -> CoreResult<Issue> {
        self.transition_as(actor, issue_id, Transition::Reject, now).await
    }

    pub async fn submit_bill(
        &self,
        actor: &Actor,
        issue_id: Uuid,
        amount: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Issue> {
        self.transition_as(actor, issue_id, Transition::SubmitBill { amount, notes }, now)
            .await
    }

    pub async fn approve_bill(&self, actor: &Actor, issue_id: Uuid, now: DateTime<Utc>) -> CoreResult<Issue> {
        self.transition_as(actor, issue_id, Transition::Approve, now).await
    }

    /// Scoped view for the vendor link; unknown issue and bad token look the same
    pub async fn view_via_link(&self, capability: &VendorCapability) -> CoreResult<Issue> {
        let issue = self.linked_issue(capability, Action::View).await?;
        Ok(issue)
    }

    /// Accept, reject or bill through the vendor link, without a session
    pub async fn respond_via_link(
        &self,
        capability: &VendorCapability,
        response: VendorResponse,
        now: DateTime<Utc>,
    ) -> CoreResult<Issue> {
        let transition = response.into_transition();
        let issue = self.linked_issue(capability, transition.action()).await?;

        let updated = match self.commit(&issue, &transition, now).await? {
            Some(updated) => updated,
            None => {
                tracing::warn!(issue_id = %issue.id, "Vendor link lost a race");
                return Err(CoreError::InvalidOrExpiredCredential);
            }
        };

        self.after_vendor_transition(issue.vendor_id, &updated, &transition).await;
        Ok(updated)
    }

    async fn linked_issue(&self, capability: &VendorCapability, action: Action) -> CoreResult<Issue> {
        let issue = self
            .store
            .find_issue(capability.issue_id)
            .await?
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        let matches = self.credentials.vendor_token_matches(
            issue.id,
            &capability.token,
            issue.vendor_token_hash.as_deref(),
        );
        if let Err(e) = authorize_vendor_link(matches, issue.status, action) {
            tracing::warn!(issue_id = %capability.issue_id, action = action.as_str(), "Vendor link refused");
            return Err(e);
        }
        Ok(issue)
    }

    async fn transition_as(
        &self,
        actor: &Actor,
        issue_id: Uuid,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> CoreResult<Issue> {
        let (issue, resource) = self.hierarchy().issue(issue_id).await?;
        authorize(actor, transition.action(), &resource)?;

        let updated = self.commit_for_actor(actor, &issue, &transition, now).await?;

        match transition {
            Transition::Approve => {
                tracing::info!(issue_id = %updated.id, by = %actor.user_id, "Bill approved");
                self.record(Some(actor.user_id), updated.property_id, "Bill approved".to_string())
                    .await;

                if let (Some(vendor_id), Some(amount)) = (updated.vendor_id, updated.bill_amount) {
                    if let Ok(Some(vendor)) = self.store.find_user(vendor_id).await {
                        let property = self.property_name(updated.property_id).await;
                        self.notify(messages::bill_approved(&vendor.email, &property, amount)).await;
                    }
                }
            }
            _ => self.after_vendor_transition(issue.vendor_id, &updated, &transition).await,
        }

        Ok(updated)
    }

    /// Plans and applies; `None` when the row changed underneath
    async fn commit(
        &self,
        issue: &Issue,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Issue>> {
        let next = plan_transition(issue, transition, now)?;
        let change = IssueTransition {
            issue_id: issue.id,
            expected: issue.guard(),
            next,
        };
        Ok(self.store.apply_issue_transition(&change).await?)
    }

    async fn commit_for_actor(
        &self,
        actor: &Actor,
        issue: &Issue,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> CoreResult<Issue> {
        if let Some(updated) = self.commit(issue, transition, now).await? {
            return Ok(updated);
        }

        // Lost a race: explain against the row as it is now
        let (current, resource) = self.hierarchy().issue(issue.id).await?;
        authorize(actor, transition.action(), &resource)?;
        plan_transition(&current, transition, now)?;
        Err(CoreError::Conflict("issue was changed by another request".into()))
    }

    async fn after_vendor_transition(&self, vendor_id: Option<Uuid>, updated: &Issue, transition: &Transition) {
        let entry = match transition {
            Transition::Accept => "Vendor accepted the job",
            Transition::Reject => "Vendor rejected the job",
            Transition::SubmitBill { .. } => "Vendor submitted a bill",
            _ => return,
        };

        tracing::info!(issue_id = %updated.id, status = updated.status.as_str(), "{}", entry);
        self.record(vendor_id, updated.property_id, entry.to_string()).await;

        if let Transition::SubmitBill { amount, .. } = transition {
            if let Some((to, property)) = self.responsible_contact(updated.property_id).await {
                self.notify(messages::bill_submitted(&to, &property, *amount)).await;
            }
        }
    }

    async fn record(&self, user_id: Option<Uuid>, property_id: Uuid, action: String) {
        let entry = NewActivity {
            user_id,
            property_id: Some(property_id),
            action,
        };
        if let Err(e) = self.store.record_activity(entry).await {
            tracing::error!(error = %e, %property_id, "Failed to record activity");
        }
    }

    async fn notify(&self, message: EmailMessage) {
        deliver(self.mailer.as_ref(), &message).await;
    }

    async fn property_name(&self, property_id: Uuid) -> String {
        match self.store.find_property(property_id).await {
            Ok(Some(property)) => property.name,
            _ => "your property".to_string(),
        }
    }

    /// Manager if delegated, otherwise owner: (email, property name)
    async fn responsible_contact(&self, property_id: Uuid) -> Option<(String, String)> {
        let property = self.store.find_property(property_id).await.ok()??;
        let contact_id = property.manager_id.unwrap_or(property.owner_id);
        let contact = self.store.find_user(contact_id).await.ok()??;
        Some((contact.email, property.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_issue() -> Issue {
        Issue::from_new(
            NewIssue {
                property_id: Uuid::new_v4(),
                appliance_id: None,
                tenant_id: Uuid::new_v4(),
                description: "Leaking tap".into(),
            },
            Utc::now(),
        )
    }

    fn step(issue: &mut Issue, transition: Transition) -> CoreResult<()> {
        let now = Utc::now();
        let next = plan_transition(issue, &transition, now)?;
        issue.apply_fields(next, now);
        Ok(())
    }

    fn assign(vendor_id: Uuid) -> Transition {
        Transition::Assign {
            vendor_id,
            token_digest: format!("digest-{}", vendor_id),
        }
    }

    #[test]
    fn test_full_lifecycle_fields() {
        let mut issue = pending_issue();
        let vendor = Uuid::new_v4();

        step(&mut issue, assign(vendor)).unwrap();
        assert_eq!(issue.status, IssueStatus::Assigned);
        assert_eq!(issue.vendor_id, Some(vendor));
        assert!(issue.vendor_token_hash.is_some());
        assert!(issue.assigned_at.is_some());

        step(&mut issue, Transition::Accept).unwrap();
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert!(issue.vendor_token_hash.is_some());

        step(
            &mut issue,
            Transition::SubmitBill {
                amount: 1500,
                notes: Some("Replaced washer".into()),
            },
        )
        .unwrap();
        assert_eq!(issue.status, IssueStatus::Repaired);
        assert_eq!(issue.bill_amount, Some(1500));
        assert!(issue.vendor_token_hash.is_none());
        assert!(issue.completed_at.is_some());

        step(&mut issue, Transition::Approve).unwrap();
        assert_eq!(issue.status, IssueStatus::Paid);
        assert!(issue.paid_at.is_some());
        assert_eq!(issue.vendor_id, Some(vendor));
    }

    #[test]
    fn test_reject_returns_to_pending_unassigned() {
        for accept_first in [false, true] {
            let mut issue = pending_issue();
            step(&mut issue, assign(Uuid::new_v4())).unwrap();
            if accept_first {
                step(&mut issue, Transition::Accept).unwrap();
            }

            step(&mut issue, Transition::Reject).unwrap();
            assert_eq!(issue.status, IssueStatus::Pending);
            assert!(issue.vendor_id.is_none());
            assert!(issue.vendor_token_hash.is_none());
            assert!(issue.assigned_at.is_none());
        }
    }

    #[test]
    fn test_only_table_edges_are_legal() {
        let transitions = || {
            vec![
                assign(Uuid::new_v4()),
                Transition::Accept,
                Transition::Reject,
                Transition::SubmitBill {
                    amount: 10,
                    notes: None,
                },
                Transition::Approve,
            ]
        };
        let legal = [
            (IssueStatus::Pending, IssueStatus::Assigned),
            (IssueStatus::Assigned, IssueStatus::InProgress),
            (IssueStatus::Assigned, IssueStatus::Pending),
            (IssueStatus::Assigned, IssueStatus::Repaired),
            (IssueStatus::InProgress, IssueStatus::Pending),
            (IssueStatus::InProgress, IssueStatus::Repaired),
            (IssueStatus::Repaired, IssueStatus::Paid),
        ];

        for from in [
            IssueStatus::Pending,
            IssueStatus::Assigned,
            IssueStatus::InProgress,
            IssueStatus::Repaired,
            IssueStatus::Paid,
        ] {
            for transition in transitions() {
                let mut issue = pending_issue();
                issue.status = from;
                if from.is_with_vendor() {
                    issue.vendor_id = Some(Uuid::new_v4());
                }

                let before = issue.workflow_fields();
                let result = plan_transition(&issue, &transition, Utc::now());
                let expected_legal = legal.contains(&(from, transition.target()));

                match result {
                    Ok(next) => {
                        assert!(expected_legal, "{:?} from {:?} should be illegal", transition, from);
                        assert_eq!(next.status, transition.target());
                    }
                    Err(CoreError::IllegalStateTransition { status, .. }) => {
                        assert!(!expected_legal, "{:?} from {:?} should be legal", transition, from);
                        assert_eq!(status, from);
                        assert_eq!(issue.workflow_fields(), before);
                    }
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_bill_must_be_positive() {
        let mut issue = pending_issue();
        step(&mut issue, assign(Uuid::new_v4())).unwrap();

        for amount in [0, -5] {
            let result = plan_transition(
                &issue,
                &Transition::SubmitBill { amount, notes: None },
                Utc::now(),
            );
            assert!(matches!(result, Err(CoreError::Validation(_))));
        }
    }

    #[test]
    fn test_reassignment_resets_previous_bill() {
        let mut issue = pending_issue();
        issue.bill_amount = Some(99);
        issue.completed_at = Some(Utc::now() - Duration::days(1));

        step(&mut issue, assign(Uuid::new_v4())).unwrap();
        assert!(issue.bill_amount.is_none());
        assert!(issue.completed_at.is_none());
    }

    #[test]
    fn test_vendor_response_parsing() {
        let bill: VendorResponse =
            serde_json::from_str(r#"{"action":"bill","bill_amount":1500,"repair_notes":"done"}"#).unwrap();
        assert_eq!(
            bill,
            VendorResponse::Bill {
                bill_amount: 1500,
                repair_notes: Some("done".into())
            }
        );

        let accept: VendorResponse = serde_json::from_str(r#"{"action":"accept"}"#).unwrap();
        assert_eq!(accept, VendorResponse::Accept);
    }
}
