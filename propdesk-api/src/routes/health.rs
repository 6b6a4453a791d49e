/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {"status": "healthy", "version": "0.1.0", "storage": "connected"}
/// ```
///
/// A storage failure reports `degraded` with 503 so load balancers stop
/// routing to the instance.

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, storage) = match state.services.store.ping().await {
        Ok(()) => ("healthy", StatusCode::OK, "connected"),
        Err(e) => {
            tracing::error!(error = %e, "Storage health check failed");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage: storage.to_string(),
        }),
    )
}
