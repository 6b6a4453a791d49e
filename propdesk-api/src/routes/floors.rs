/// Floor endpoints
///
/// - `GET /v1/floors/:id`
/// - `PUT /v1/floors/:id` - Renumber the floor
/// - `DELETE /v1/floors/:id` - Owners; removes the floor's appliances too
/// - `PUT /v1/floors/:id/plan?file_name=plan.pdf` - Raw body upload of the floor plan

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;
use propdesk_shared::models::property::Floor;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct PlanParams {
    /// Original name; stored sanitized
    pub file_name: Option<String>,
}

pub async fn get_floor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Floor>> {
    let floor = state.services.portfolio.view_floor(&current.actor, id).await?;
    Ok(Json(floor))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFloorRequest {
    #[validate(length(min = 1, max = 20, message = "Floor number must be 1-20 characters"))]
    pub floor_number: String,
}

/// # Errors
///
/// - `409 Conflict`: another floor of the property has that number
pub async fn update_floor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFloorRequest>,
) -> ApiResult<Json<Floor>> {
    req.validate()?;

    let floor = state
        .services
        .portfolio
        .update_floor(&current.actor, id, &req.floor_number)
        .await?;
    Ok(Json(floor))
}

pub async fn delete_floor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.portfolio.delete_floor(&current.actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stores the request body as the floor plan
///
/// # Errors
///
/// - `413 Payload Too Large`: body over the upload limit
/// - `422 Unprocessable Entity`: empty body
pub async fn upload_plan(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Query(params): Query<PlanParams>,
    body: Bytes,
) -> ApiResult<Json<Floor>> {
    let file_name = params.file_name.unwrap_or_else(|| "plan".to_string());
    let floor = state
        .services
        .portfolio
        .attach_floor_plan(&current.actor, id, body, &file_name)
        .await?;
    Ok(Json(floor))
}
