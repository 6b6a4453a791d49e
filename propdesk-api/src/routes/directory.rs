/// People directory, activity feed and dashboard
///
/// - `GET /v1/directory/vendors` - Owners and managers choosing a vendor
/// - `GET /v1/directory/managers` - Owners choosing a manager
/// - `GET /v1/activity?limit=20` - Recent activity on the caller's properties
/// - `GET /v1/dashboard/appliance-stats` - Appliance health summary

use crate::{app::AppState, error::ApiResult, middleware::identity::CurrentUser};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use propdesk_shared::{
    models::{
        activity::ActivityLog,
        user::{Role, User},
    },
    services::portfolio::ApplianceStats,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    /// 1-100, default 20
    pub limit: Option<i64>,
}

async fn directory(state: &AppState, current: &CurrentUser, role: Role) -> ApiResult<Json<Vec<User>>> {
    let users = state.services.portfolio.directory(&current.actor, role).await?;
    Ok(Json(users))
}

pub async fn list_vendors(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<User>>> {
    directory(&state, &current, Role::Vendor).await
}

pub async fn list_managers(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<User>>> {
    directory(&state, &current, Role::Manager).await
}

pub async fn recent_activity(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<ActivityParams>,
) -> ApiResult<Json<Vec<ActivityLog>>> {
    let entries = state
        .services
        .portfolio
        .activity(&current.actor, params.limit)
        .await?;
    Ok(Json(entries))
}

/// Working share, condition counts per appliance type and warranties ending
/// within 90 days, over the caller's owned or managed properties
pub async fn appliance_stats(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<ApplianceStats>> {
    let stats = state
        .services
        .portfolio
        .appliance_stats(&current.actor, Utc::now().date_naive())
        .await?;
    Ok(Json(stats))
}
