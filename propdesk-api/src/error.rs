/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`, which converts to an HTTP
/// status and a JSON body `{error, message, details?}`. Engine errors map
/// as follows:
///
/// | `CoreError`                 | status |
/// |-----------------------------|--------|
/// | Unauthenticated             | 401    |
/// | Forbidden                   | 403    |
/// | InvalidOrExpiredCredential  | 400    |
/// | IllegalStateTransition      | 409    |
/// | NotFound                    | 404    |
/// | Validation                  | 422    |
/// | Conflict                    | 409    |
/// | Storage / Internal          | 500    |
///
/// # Example
///
/// ```
/// use propdesk_api::error::{ApiError, ApiResult};
/// use axum::Json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::NotFound("property not found".to_string()))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use propdesk_shared::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

/// Fixed message for every credential failure, so none reveals which part was wrong
pub const INVALID_OR_EXPIRED: &str = "invalid or expired";

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409, e.g. duplicate email or an illegal lifecycle step
    Conflict(String),

    /// 422 with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// 500; the message is logged, never sent
    InternalError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. "forbidden"
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unauthenticated => ApiError::Unauthorized("authentication required".to_string()),
            CoreError::Forbidden(reason) => ApiError::Forbidden(reason.as_str().to_string()),
            CoreError::InvalidOrExpiredCredential => ApiError::BadRequest(INVALID_OR_EXPIRED.to_string()),
            CoreError::IllegalStateTransition { .. } => ApiError::Conflict(err.to_string()),
            CoreError::NotFound(entity) => ApiError::NotFound(format!("{} not found", entity)),
            CoreError::Validation(msg) => ApiError::invalid("request", msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Storage(e) => ApiError::InternalError(format!("storage error: {}", e)),
            CoreError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Collects `validator` failures into per-field details
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propdesk_shared::{error::DenyReason, models::issue::IssueStatus};

    fn status_of(err: CoreError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_statuses() {
        assert_eq!(status_of(CoreError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(CoreError::Forbidden(DenyReason::NotOwner)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CoreError::InvalidOrExpiredCredential),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::IllegalStateTransition {
                status: IssueStatus::Paid,
                action: "approve"
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(CoreError::NotFound("issue")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CoreError::Validation("bad".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CoreError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_credential_failures_share_one_message() {
        match ApiError::from(CoreError::InvalidOrExpiredCredential) {
            ApiError::BadRequest(msg) => assert_eq!(msg, INVALID_OR_EXPIRED),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::NotFound("issue not found".to_string());
        assert_eq!(err.to_string(), "Not found: issue not found");

        let err = ApiError::invalid("email", "Invalid email format");
        assert_eq!(err.to_string(), "Validation failed: 1 errors");
    }
}
