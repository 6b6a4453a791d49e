/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Create an owner, manager or vendor account
/// - `POST /v1/auth/verify-otp` - Confirm a registration code
/// - `POST /v1/auth/resend-otp` - Re-send the registration code
/// - `POST /v1/auth/login` - Password login; sets the session cookie
/// - `POST /v1/auth/logout` - Ends the session named by the cookie
/// - `POST /v1/auth/login-otp/request` - Email a login code
/// - `POST /v1/auth/login-otp/verify` - Trade a login code for a bearer token
/// - `POST /v1/auth/forgot-password` - Email a reset code
/// - `POST /v1/auth/reset-password` - Set a new password with a reset code
/// - `GET /v1/auth/me` - The caller's account
/// - `DELETE /v1/auth/me` - Delete the caller's account
///
/// Endpoints that send a code answer identically whether or not the email
/// belongs to an account.

use crate::{
    app::AppState,
    error::ApiResult,
    middleware::identity::{cleared_session_cookie, session_cookie, session_token, CurrentUser},
    routes::MessageResponse,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use propdesk_shared::{
    auth::session::AccessToken,
    models::user::{Role, User},
    services::accounts::Registration,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

const CODE_SENT: &str = "If the account exists, a code has been sent";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// owner, manager or vendor
    pub role: Role,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    /// Trade of a vendor, e.g. "plumbing"
    #[validate(length(max = 100, message = "Service type must be at most 100 characters"))]
    pub service_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,

    /// True when a code was emailed and must be confirmed before login
    pub verification_required: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 16, message = "Code is required"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username or email
    #[validate(length(min = 1, message = "Login is required"))]
    pub login: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 16, message = "Code is required"))]
    pub code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Register a new account
///
/// ```text
/// POST /v1/auth/register
///
/// {"username": "olivia", "email": "olivia@example.com",
///  "password": "password123", "role": "owner"}
/// ```
///
/// # Errors
///
/// - `409 Conflict`: email or username taken
/// - `422 Unprocessable Entity`: invalid input, or `role` is tenant
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let user = state
        .services
        .accounts
        .register(
            Registration {
                username: req.username,
                email: req.email,
                password: req.password,
                role: req.role,
                name: req.name,
                phone: req.phone,
                service_type: req.service_type,
            },
            Utc::now(),
        )
        .await?;

    let verification_required = !user.is_verified;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            verification_required,
        }),
    ))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let user = state
        .services
        .accounts
        .verify_registration(&req.email, req.code.trim(), Utc::now())
        .await?;
    Ok(Json(user))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state.services.accounts.resend_otp(&req.email, Utc::now()).await?;
    Ok(Json(MessageResponse::new(CODE_SENT)))
}

/// Password login
///
/// On success the response sets the `propdesk_session` cookie.
///
/// # Errors
///
/// - `401 Unauthorized`: unknown login or wrong password
/// - `403 Forbidden`: owner or manager has not confirmed their email
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let now = Utc::now();
    let accounts = &state.services.accounts;
    let session = accounts.login(&req.login, &req.password, now).await?;
    let (_, user) = state.services.identity.actor(&session.identity).await?;

    let cookie = session_cookie(
        &session.token,
        session.expires_at - now,
        state.secure_cookies(),
    )?;

    tracing::info!(user_id = %user.id, "Session started");
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(LoginResponse {
            user,
            expires_at: session.expires_at,
        }),
    ))
}

/// Ends the cookie's session, if any, and clears the cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    if let Some(token) = session_token(&headers) {
        state.services.accounts.logout(&token).await?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, cleared_session_cookie(state.secure_cookies()))]),
    ))
}

pub async fn request_login_otp(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .services
        .accounts
        .request_login_otp(&req.email, Utc::now())
        .await?;
    Ok(Json(MessageResponse::new(CODE_SENT)))
}

/// Trades a login code for a short-lived bearer access token
pub async fn verify_login_otp(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<AccessToken>> {
    req.validate()?;

    let token = state
        .services
        .accounts
        .verify_login_otp(&req.email, req.code.trim(), Utc::now())
        .await?;
    Ok(Json(token))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .services
        .accounts
        .forgot_password(&req.email, Utc::now())
        .await?;
    Ok(Json(MessageResponse::new(CODE_SENT)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .services
        .accounts
        .reset_password(&req.email, req.code.trim(), &req.new_password, Utc::now())
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.user)
}

/// Deletes the caller's account and clears the cookie
///
/// # Errors
///
/// - `409 Conflict`: the caller still owns or manages a property
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    state
        .services
        .accounts
        .delete_user(&current.actor, current.user.id)
        .await?;

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, cleared_session_cookie(state.secure_cookies()))]),
    ))
}
