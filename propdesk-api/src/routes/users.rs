/// Account management by property owners
///
/// - `PUT /v1/users/:id/tenancy` - Place a tenant in a property, floor and flat
/// - `DELETE /v1/users/:id` - Remove an account (self, or an owner's tenant)

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use propdesk_shared::models::user::{TenantAssignment, User};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AssignTenantRequest {
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,

    #[validate(length(max = 20))]
    pub flat_no: Option<String>,

    #[validate(length(max = 20))]
    pub room_no: Option<String>,
}

pub async fn assign_tenant(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTenantRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let user = state
        .services
        .portfolio
        .assign_tenant(
            &current.actor,
            id,
            TenantAssignment {
                property_id: req.property_id,
                floor_id: req.floor_id,
                flat_no: req.flat_no,
                room_no: req.room_no,
            },
        )
        .await?;
    Ok(Json(user))
}

/// # Errors
///
/// - `409 Conflict`: the account still owns or manages a property
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.accounts.delete_user(&current.actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
