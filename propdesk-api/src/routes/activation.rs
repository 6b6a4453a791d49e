/// Tenant invitation redemption
///
/// - `GET /v1/activate/:token` - Invitation details for the sign-up form
/// - `POST /v1/activate/:token` - Create the tenant account and log in
///
/// Unknown, expired and already-used tokens all answer
/// `400 invalid or expired`.

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::identity::session_cookie,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use propdesk_shared::services::invitations::{Activation, InvitationPreview};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    /// Defaults to the invited email
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

pub async fn preview(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<InvitationPreview>> {
    let preview = state
        .services
        .invitations
        .preview(&token, Utc::now())
        .await?;
    Ok(Json(preview))
}

/// Redeems the invitation; the new tenant is logged in via cookie
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let now = Utc::now();
    let (user, session) = state
        .services
        .invitations
        .activate(
            &token,
            Activation {
                username: req.username,
                name: req.name,
                phone: req.phone,
                password: req.password,
                confirm_password: req.confirm_password,
            },
            now,
        )
        .await?;

    let cookie = session_cookie(
        &session.token,
        session.expires_at - now,
        state.secure_cookies(),
    )?;

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(user),
    ))
}
