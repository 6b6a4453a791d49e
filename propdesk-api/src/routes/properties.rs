/// Property endpoints
///
/// - `GET /v1/properties` - Properties visible to the caller
/// - `POST /v1/properties` - Create (owners)
/// - `GET|PUT|DELETE /v1/properties/:id`
/// - `PUT /v1/properties/:id/manager` - Delegate to a manager, or revoke with `null`
/// - `GET|POST /v1/properties/:id/floors`
/// - `GET|POST /v1/properties/:id/appliances`
///
/// Every call is checked against the authorization matrix by the portfolio
/// service; handlers only translate.

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use propdesk_shared::{
    models::property::{Floor, Property, PropertyUpdate},
    services::portfolio::{ApplianceInput, ApplianceView, PropertyInput},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePropertyRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 500, message = "Address must be 1-500 characters"))]
    pub address: String,

    /// e.g. "apartment", "house"
    #[validate(length(max = 50, message = "Property type must be at most 50 characters"))]
    pub property_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePropertyRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 500, message = "Address must be 1-500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 50, message = "Property type must be at most 50 characters"))]
    pub property_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignManagerRequest {
    /// `null` takes the delegation back
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddFloorRequest {
    #[validate(length(min = 1, max = 20, message = "Floor number must be 1-20 characters"))]
    pub floor_number: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddApplianceRequest {
    pub floor_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

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

pub async fn list_properties(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<Property>>> {
    let properties = state
        .services
        .portfolio
        .list_properties(&current.user)
        .await?;
    Ok(Json(properties))
}

pub async fn create_property(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePropertyRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let property = state
        .services
        .portfolio
        .create_property(
            &current.actor,
            PropertyInput {
                name: req.name,
                address: req.address,
                property_type: req.property_type,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn get_property(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Property>> {
    let property = state
        .services
        .portfolio
        .view_property(&current.actor, id)
        .await?;
    Ok(Json(property))
}

pub async fn update_property(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePropertyRequest>,
) -> ApiResult<Json<Property>> {
    req.validate()?;

    let property = state
        .services
        .portfolio
        .update_property(
            &current.actor,
            id,
            PropertyUpdate {
                name: req.name,
                address: req.address,
                property_type: req.property_type,
            },
        )
        .await?;
    Ok(Json(property))
}

/// Removes the property with its floors, appliances, issues and invitations
pub async fn delete_property(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .services
        .portfolio
        .delete_property(&current.actor, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_manager(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignManagerRequest>,
) -> ApiResult<Json<Property>> {
    let property = state
        .services
        .portfolio
        .assign_manager(&current.actor, id, req.manager_id)
        .await?;
    Ok(Json(property))
}

pub async fn list_floors(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Floor>>> {
    let floors = state
        .services
        .portfolio
        .list_floors(&current.actor, id)
        .await?;
    Ok(Json(floors))
}

pub async fn add_floor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddFloorRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let floor = state
        .services
        .portfolio
        .add_floor(&current.actor, id, req.floor_number.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(floor)))
}

/// Appliances with their warranty status as of today
pub async fn list_appliances(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ApplianceView>>> {
    let today = Utc::now().date_naive();
    let appliances = state
        .services
        .portfolio
        .list_appliances(&current.actor, id)
        .await?
        .into_iter()
        .map(|appliance| ApplianceView::new(appliance, today))
        .collect();
    Ok(Json(appliances))
}

pub async fn add_appliance(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddApplianceRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let appliance = state
        .services
        .portfolio
        .add_appliance(
            &current.actor,
            id,
            ApplianceInput {
                floor_id: req.floor_id,
                name: req.name,
                model: req.model,
                color: req.color,
                status: req.status,
                location: req.location,
                warranty_expiry: req.warranty_expiry,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApplianceView::new(appliance, Utc::now().date_naive())),
    ))
}
