/// Issue lifecycle endpoints
///
/// - `GET /v1/issues` - Issues visible to the caller
/// - `POST /v1/appliances/:id/issues` - Report (tenants)
/// - `GET /v1/issues/:id`
/// - `POST /v1/issues/:id/assign` - `{"vendor_id": ".."}` (owner or manager)
/// - `POST /v1/issues/:id/accept` | `reject` (assigned vendor)
/// - `POST /v1/issues/:id/bill` - `{"bill_amount": 12500, "repair_notes": ".."}`
/// - `POST /v1/issues/:id/approve` (owner or manager)
///
/// A step the issue's current status does not allow answers 409 and leaves
/// the issue unchanged.

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use propdesk_shared::models::issue::Issue;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ReportIssueRequest {
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignVendorRequest {
    pub vendor_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitBillRequest {
    /// Minor currency units
    #[validate(range(min = 1, message = "Bill amount must be positive"))]
    pub bill_amount: i64,

    #[validate(length(max = 2000))]
    pub repair_notes: Option<String>,
}

pub async fn list_issues(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Issue>>> {
    let issues = state.services.workflow.list(&current.actor).await?;
    Ok(Json(issues))
}

pub async fn report_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(appliance_id): Path<Uuid>,
    Json(req): Json<ReportIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let issue = state
        .services
        .workflow
        .report(&current.actor, appliance_id, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn get_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Issue>> {
    let issue = state.services.workflow.view(&current.actor, id).await?;
    Ok(Json(issue))
}

/// Assigns a vendor and emails them the response link
///
/// The link token goes only to the vendor; it is not part of the response.
pub async fn assign_vendor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignVendorRequest>,
) -> ApiResult<Json<Issue>> {
    let assignment = state
        .services
        .workflow
        .assign_vendor(&current.actor, id, req.vendor_id, Utc::now())
        .await?;
    Ok(Json(assignment.issue))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Issue>> {
    let issue = state
        .services
        .workflow
        .accept(&current.actor, id, Utc::now())
        .await?;
    Ok(Json(issue))
}

/// Hands the issue back; it returns to pending with no vendor
pub async fn reject(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Issue>> {
    let issue = state
        .services
        .workflow
        .reject(&current.actor, id, Utc::now())
        .await?;
    Ok(Json(issue))
}

pub async fn submit_bill(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitBillRequest>,
) -> ApiResult<Json<Issue>> {
    req.validate()?;

    let issue = state
        .services
        .workflow
        .submit_bill(&current.actor, id, req.bill_amount, req.repair_notes, Utc::now())
        .await?;
    Ok(Json(issue))
}

pub async fn approve_bill(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Issue>> {
    let issue = state
        .services
        .workflow
        .approve_bill(&current.actor, id, Utc::now())
        .await?;
    Ok(Json(issue))
}
