/// Appliance endpoints
///
/// - `GET /v1/appliances/:id` - With warranty status
/// - `PUT /v1/appliances/:id` - Owners and managers; absent fields are kept
/// - `DELETE /v1/appliances/:id` - Owners
///
/// Issues are reported against an appliance at
/// `POST /v1/appliances/:id/issues` (see `issues`).

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use propdesk_shared::{models::appliance::ApplianceUpdate, services::portfolio::ApplianceView};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateApplianceRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 100))]
    pub model: Option<String>,

    #[validate(length(max = 50))]
    pub color: Option<String>,

    #[validate(length(max = 50))]
    pub status: Option<String>,

    #[validate(length(max = 200))]
    pub location: Option<String>,

    pub warranty_expiry: Option<NaiveDate>,
}

pub async fn get_appliance(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApplianceView>> {
    let appliance = state
        .services
        .portfolio
        .view_appliance(&current.actor, id)
        .await?;
    Ok(Json(ApplianceView::new(appliance, Utc::now().date_naive())))
}

pub async fn update_appliance(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateApplianceRequest>,
) -> ApiResult<Json<ApplianceView>> {
    req.validate()?;

    let appliance = state
        .services
        .portfolio
        .update_appliance(
            &current.actor,
            id,
            ApplianceUpdate {
                name: req.name,
                model: req.model,
                color: req.color,
                status: req.status,
                location: req.location,
                warranty_expiry: req.warranty_expiry,
            },
        )
        .await?;
    Ok(Json(ApplianceView::new(appliance, Utc::now().date_naive())))
}

pub async fn delete_appliance(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .services
        .portfolio
        .delete_appliance(&current.actor, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
