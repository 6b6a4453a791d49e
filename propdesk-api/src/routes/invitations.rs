/// Tenant invitation endpoints
///
/// - `GET /v1/invitations` - Open invitations on the caller's properties
/// - `POST /v1/invitations` - Invite a tenant by email (property owner)
/// - `DELETE /v1/invitations/:id` - Withdraw an open invitation
///
/// The invitee receives `APP_URL/v1/activate/{token}`; the token is never
/// returned to the inviter.

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use propdesk_shared::{models::pending_tenant::PendingTenant, services::invitations::Invite};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InviteTenantRequest {
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,

    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 20))]
    pub flat_no: Option<String>,

    #[validate(length(max = 20))]
    pub room_no: Option<String>,
}

pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<PendingTenant>>> {
    let invitations = state.services.invitations.list(&current.actor).await?;
    Ok(Json(invitations))
}

/// # Errors
///
/// - `403 Forbidden`: caller does not own the property
/// - `409 Conflict`: an account or open invitation already uses the email
pub async fn invite_tenant(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<InviteTenantRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let invitation = state
        .services
        .invitations
        .invite(
            &current.actor,
            Invite {
                property_id: req.property_id,
                floor_id: req.floor_id,
                name: req.name,
                email: req.email,
                flat_no: req.flat_no,
                room_no: req.room_no,
            },
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.invitations.revoke(&current.actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
