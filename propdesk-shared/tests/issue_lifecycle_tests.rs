/// End-to-end issue lifecycle over the in-memory store
///
/// Run with: cargo test --test issue_lifecycle_tests

mod common;

use chrono::Utc;
use common::{vendor_token, World};
use propdesk_shared::{
    auth::session::VendorCapability,
    error::{CoreError, DenyReason},
    models::issue::IssueStatus,
    workflow::VendorResponse,
};

#[tokio::test]
async fn test_report_assign_accept_bill_approve() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow
        .report(&cast.tenant, cast.appliance.id, "Boiler makes a banging noise")
        .await
        .unwrap();
    assert_eq!(issue.status, IssueStatus::Pending);
    assert_eq!(issue.property_id, cast.property.id);
    // Manager is notified of the report
    assert_eq!(world.mailer.sent_to("mia@example.com").len(), 1);

    let assignment = workflow
        .assign_vendor(&cast.manager, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    assert_eq!(assignment.issue.status, IssueStatus::Assigned);
    assert_eq!(assignment.issue.vendor_id, Some(cast.vendor.user_id));
    assert_eq!(vendor_token(&world.mailer, &cast.vendor_email), assignment.vendor_token);

    let accepted = workflow.accept(&cast.vendor, issue.id, now).await.unwrap();
    assert_eq!(accepted.status, IssueStatus::InProgress);

    let billed = workflow
        .submit_bill(&cast.vendor, issue.id, 12_500, Some("Replaced valve".into()), now)
        .await
        .unwrap();
    assert_eq!(billed.status, IssueStatus::Repaired);
    assert_eq!(billed.bill_amount, Some(12_500));

    // Only owner and manager approve
    assert!(matches!(
        workflow.approve_bill(&cast.vendor, issue.id, now).await,
        Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
    ));
    let paid = workflow.approve_bill(&cast.owner, issue.id, now).await.unwrap();
    assert_eq!(paid.status, IssueStatus::Paid);
    assert!(paid.paid_at.is_some());

    // Paid is terminal
    assert!(matches!(
        workflow.approve_bill(&cast.owner, issue.id, now).await,
        Err(CoreError::IllegalStateTransition {
            status: IssueStatus::Paid,
            ..
        })
    ));
}

#[tokio::test]
async fn test_vendor_link_flow_and_token_single_use() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Leak").await.unwrap();
    let assignment = workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();

    let capability = VendorCapability {
        issue_id: issue.id,
        token: assignment.vendor_token.clone(),
    };

    let seen = workflow.view_via_link(&capability).await.unwrap();
    assert_eq!(seen.id, issue.id);

    workflow
        .respond_via_link(&capability, VendorResponse::Accept, now)
        .await
        .unwrap();
    let billed = workflow
        .respond_via_link(
            &capability,
            VendorResponse::Bill {
                bill_amount: 900,
                repair_notes: None,
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(billed.status, IssueStatus::Repaired);
    assert!(billed.vendor_token_hash.is_none());

    // The token dies with the bill
    assert!(matches!(
        workflow.view_via_link(&capability).await,
        Err(CoreError::InvalidOrExpiredCredential)
    ));
    assert!(matches!(
        workflow.respond_via_link(&capability, VendorResponse::Reject, now).await,
        Err(CoreError::InvalidOrExpiredCredential)
    ));
}

#[tokio::test]
async fn test_vendor_link_is_bound_to_one_issue() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let first = workflow.report(&cast.tenant, cast.appliance.id, "One").await.unwrap();
    let second = workflow.report(&cast.tenant, cast.appliance.id, "Two").await.unwrap();
    let assignment = workflow
        .assign_vendor(&cast.owner, first.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    workflow
        .assign_vendor(&cast.owner, second.id, cast.vendor.user_id, now)
        .await
        .unwrap();

    let borrowed = VendorCapability {
        issue_id: second.id,
        token: assignment.vendor_token,
    };
    assert!(matches!(
        workflow.respond_via_link(&borrowed, VendorResponse::Accept, now).await,
        Err(CoreError::InvalidOrExpiredCredential)
    ));

    let unknown = VendorCapability {
        issue_id: common::random_id(),
        token: "A".repeat(43),
    };
    assert!(matches!(
        workflow.view_via_link(&unknown).await,
        Err(CoreError::InvalidOrExpiredCredential)
    ));
}

#[tokio::test]
async fn test_reject_then_reassign_issues_fresh_token() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Door").await.unwrap();
    let first = workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();

    let rejected = workflow.reject(&cast.vendor, issue.id, now).await.unwrap();
    assert_eq!(rejected.status, IssueStatus::Pending);
    assert!(rejected.vendor_id.is_none());

    // Vendor no longer holds the job
    assert!(matches!(
        workflow.accept(&cast.vendor, issue.id, now).await,
        Err(CoreError::Forbidden(DenyReason::NotAssignedVendor))
    ));

    let second = workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    assert_ne!(first.vendor_token, second.vendor_token);

    let stale = VendorCapability {
        issue_id: issue.id,
        token: first.vendor_token,
    };
    assert!(matches!(
        workflow.respond_via_link(&stale, VendorResponse::Accept, now).await,
        Err(CoreError::InvalidOrExpiredCredential)
    ));
}

#[tokio::test]
async fn test_illegal_transitions_leave_issue_untouched() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Window").await.unwrap();

    assert!(matches!(
        workflow.approve_bill(&cast.owner, issue.id, now).await,
        Err(CoreError::IllegalStateTransition {
            status: IssueStatus::Pending,
            action: "approve"
        })
    ));

    workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    assert!(matches!(
        workflow
            .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
            .await,
        Err(CoreError::IllegalStateTransition {
            status: IssueStatus::Assigned,
            ..
        })
    ));

    let current = workflow.view(&cast.owner, issue.id).await.unwrap();
    assert_eq!(current.status, IssueStatus::Assigned);
}

#[tokio::test]
async fn test_visibility_of_issues_per_role() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Fridge").await.unwrap();

    // A second tenant in the same property cannot read someone else's report
    let neighbour = propdesk_shared::auth::session::actor_of(
        &world
            .user(
                "nina",
                propdesk_shared::models::user::Role::Tenant,
                Some(propdesk_shared::models::user::TenantAssignment {
                    property_id: cast.property.id,
                    ..Default::default()
                }),
            )
            .await,
    );
    assert!(matches!(
        workflow.view(&neighbour, issue.id).await,
        Err(CoreError::Forbidden(DenyReason::NotReporter))
    ));
    assert!(workflow.list(&neighbour).await.unwrap().is_empty());

    assert_eq!(workflow.list(&cast.tenant).await.unwrap().len(), 1);
    assert_eq!(workflow.list(&cast.manager).await.unwrap().len(), 1);
    assert_eq!(workflow.list(&cast.owner).await.unwrap().len(), 1);
    assert!(workflow.list(&cast.vendor).await.unwrap().is_empty());

    workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    assert_eq!(workflow.list(&cast.vendor).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_manager_cannot_touch_foreign_property() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let other_owner = propdesk_shared::auth::session::actor_of(
        &world
            .user("oscar", propdesk_shared::models::user::Role::Owner, None)
            .await,
    );
    let other = world.property_of(&other_owner, "Elm House").await;
    let tenant = propdesk_shared::auth::session::actor_of(
        &world
            .user(
                "theo",
                propdesk_shared::models::user::Role::Tenant,
                Some(propdesk_shared::models::user::TenantAssignment {
                    property_id: other.id,
                    ..Default::default()
                }),
            )
            .await,
    );
    let appliance = world
        .services
        .portfolio
        .add_appliance(
            &other_owner,
            other.id,
            propdesk_shared::services::portfolio::ApplianceInput {
                floor_id: None,
                name: "Oven".into(),
                model: None,
                color: None,
                status: None,
                location: None,
                warranty_expiry: None,
            },
        )
        .await
        .unwrap();
    let issue = workflow.report(&tenant, appliance.id, "Oven dead").await.unwrap();

    assert!(matches!(
        workflow
            .assign_vendor(&cast.manager, issue.id, cast.vendor.user_id, now)
            .await,
        Err(CoreError::Forbidden(DenyReason::NotDelegated))
    ));
    assert!(matches!(
        workflow
            .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
            .await,
        Err(CoreError::Forbidden(DenyReason::NotOwner))
    ));
    // Tenants cannot report against appliances outside their property
    assert!(matches!(
        workflow.report(&cast.tenant, appliance.id, "Not mine").await,
        Err(CoreError::Forbidden(DenyReason::OutsideTenancy))
    ));
}

#[tokio::test]
async fn test_assignee_must_be_vendor() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Heater").await.unwrap();
    assert!(matches!(
        workflow
            .assign_vendor(&cast.owner, issue.id, cast.manager.user_id, Utc::now())
            .await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn test_email_failure_does_not_roll_back_assignment() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Sink").await.unwrap();
    world.mailer.fail_deliveries(true);

    let assignment = workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, Utc::now())
        .await
        .unwrap();
    assert_eq!(assignment.issue.status, IssueStatus::Assigned);
    assert!(world.mailer.sent_to(&cast.vendor_email).is_empty());
}
