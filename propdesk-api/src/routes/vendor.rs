/// Vendor response links
///
/// The link emailed on assignment carries the issue id and a single-issue
/// token; no session is involved.
///
/// - `GET /v1/vendor/respond?issue_id=..&token=..` - The assigned issue
/// - `POST /v1/vendor/respond?issue_id=..&token=..` - Accept, reject or bill
///
/// ```json
/// {"action": "bill", "bill_amount": 12500, "repair_notes": "Replaced valve"}
/// ```
///
/// A token that does not match the issue, or that was cleared by a bill or a
/// rejection, answers `400 invalid or expired`.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use propdesk_shared::{
    auth::session::VendorCapability,
    models::issue::Issue,
    workflow::VendorResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LinkParams {
    pub issue_id: Uuid,
    pub token: String,
}

impl From<LinkParams> for VendorCapability {
    fn from(params: LinkParams) -> Self {
        VendorCapability {
            issue_id: params.issue_id,
            token: params.token,
        }
    }
}

pub async fn view(
    State(state): State<AppState>,
    Query(params): Query<LinkParams>,
) -> ApiResult<Json<Issue>> {
    let issue = state
        .services
        .workflow
        .view_via_link(&params.into())
        .await?;
    Ok(Json(issue))
}

pub async fn respond(
    State(state): State<AppState>,
    Query(params): Query<LinkParams>,
    Json(response): Json<VendorResponse>,
) -> ApiResult<Json<Issue>> {
    let issue = state
        .services
        .workflow
        .respond_via_link(&params.into(), response, Utc::now())
        .await?;
    Ok(Json(issue))
}
