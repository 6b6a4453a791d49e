/// Races on single-use credentials and issue transitions
///
/// Every test fires the same request from several tasks at once and checks
/// that exactly one wins.

mod common;

use chrono::Utc;
use common::{activation_token, World};
use futures::future::join_all;
use propdesk_shared::{
    auth::session::VendorCapability,
    error::CoreError,
    models::issue::IssueStatus,
    services::invitations::{Activation, Invite},
    store::Store,
    workflow::VendorResponse,
};

const RACERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activation_creates_one_account() {
    let world = World::new();
    let cast = world.cast().await;
    let now = Utc::now();

    world
        .services
        .invitations
        .invite(
            &cast.owner,
            Invite {
                property_id: cast.property.id,
                floor_id: None,
                name: "Rita".into(),
                email: "rita@example.com".into(),
                flat_no: None,
                room_no: None,
            },
            now,
        )
        .await
        .unwrap();
    let token = activation_token(&world.mailer, "rita@example.com");

    let handles = (0..RACERS).map(|i| {
        let services = world.services.clone();
        let token = token.clone();
        tokio::spawn(async move {
            services
                .invitations
                .activate(
                    &token,
                    Activation {
                        username: Some(format!("rita{}", i)),
                        name: "Rita".into(),
                        phone: None,
                        password: "password123".into(),
                        confirm_password: "password123".into(),
                    },
                    now,
                )
                .await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, CoreError::InvalidOrExpiredCredential)));

    let tenant = world
        .store
        .find_user_by_email("rita@example.com")
        .await
        .unwrap()
        .expect("tenant created");
    assert_eq!(tenant.property_id, Some(cast.property.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_link_responses_apply_once() {
    let world = World::new();
    let cast = world.cast().await;
    let now = Utc::now();

    let issue = world
        .services
        .workflow
        .report(&cast.tenant, cast.appliance.id, "Pipe burst")
        .await
        .unwrap();
    let assignment = world
        .services
        .workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();

    let handles = (0..RACERS).map(|i| {
        let services = world.services.clone();
        let capability = VendorCapability {
            issue_id: issue.id,
            token: assignment.vendor_token.clone(),
        };
        let response = if i % 2 == 0 {
            VendorResponse::Bill {
                bill_amount: 100 + i as i64,
                repair_notes: None,
            }
        } else {
            VendorResponse::Reject
        };
        tokio::spawn(async move { services.workflow.respond_via_link(&capability, response, now).await })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    // Bill and reject both clear the token, so only the first writer lands
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let current = world.store.find_issue(issue.id).await.unwrap().unwrap();
    assert!(matches!(current.status, IssueStatus::Repaired | IssueStatus::Pending));
    assert!(current.vendor_token_hash.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_pay_once() {
    let world = World::new();
    let cast = world.cast().await;
    let workflow = &world.services.workflow;
    let now = Utc::now();

    let issue = workflow.report(&cast.tenant, cast.appliance.id, "Roof").await.unwrap();
    workflow
        .assign_vendor(&cast.owner, issue.id, cast.vendor.user_id, now)
        .await
        .unwrap();
    workflow
        .submit_bill(&cast.vendor, issue.id, 5_000, None, now)
        .await
        .unwrap();

    let handles = (0..RACERS).map(|i| {
        let services = world.services.clone();
        let approver = if i % 2 == 0 { cast.owner } else { cast.manager };
        tokio::spawn(async move { services.workflow.approve_bill(&approver, issue.id, now).await })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, CoreError::IllegalStateTransition { .. } | CoreError::Conflict(_)),
            "unexpected error {:?}",
            err
        );
    }
}
