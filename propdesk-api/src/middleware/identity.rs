/// Session cookie and bearer token resolution
///
/// Protected routes sit behind [`require_identity`], which reads the
/// `propdesk_session` cookie and the `Authorization: Bearer` header, resolves
/// them through the identity resolver and inserts a [`CurrentUser`] into the
/// request extensions. Handlers take it with `Extension<CurrentUser>`.
///
/// The session cookie wins when both are presented. A request that resolves
/// to nobody is answered with 401 before reaching the handler.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use propdesk_shared::{
    auth::{authorization::Actor, session::PresentedCredentials},
    models::user::User,
};

pub const SESSION_COOKIE: &str = "propdesk_session";

/// The authenticated caller of a protected route
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub actor: Actor,
    pub user: User,
}

/// Value of the session cookie, if the request carries one
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value for a fresh session
pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::InternalError(format!("bad cookie: {}", e)))
}

/// `Set-Cookie` value that removes the session cookie
pub fn cleared_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("propdesk_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("propdesk_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}

/// Rejects unauthenticated requests and attaches [`CurrentUser`]
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = PresentedCredentials {
        session_token: session_token(req.headers()),
        bearer_token: bearer_token(req.headers()),
    };

    if presented.session_token.is_none() && presented.bearer_token.is_none() {
        return Err(ApiError::Unauthorized("authentication required".to_string()));
    }

    let identity = state
        .services
        .identity
        .resolve(&presented, Utc::now())
        .await?
        .ok_or_else(|| {
            tracing::debug!("Presented credentials did not resolve");
            ApiError::Unauthorized("authentication required".to_string())
        })?;

    let (actor, user) = state.services.identity.actor(&identity).await?;

    req.extensions_mut().insert(CurrentUser { actor, user });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_found_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; propdesk_session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_empty_or_missing_cookie() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());

        headers.insert(header::COOKIE, HeaderValue::from_static("propdesk_session="));
        assert!(session_token(&headers).is_none());
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer eyJ.x.y"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("eyJ.x.y"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", Duration::hours(1), true).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("propdesk_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("Secure"));

        let plain = session_cookie("tok", Duration::hours(1), false).unwrap();
        assert!(!plain.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_cleared_cookie_expires_immediately() {
        let cookie = cleared_session_cookie(false);
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }
}
