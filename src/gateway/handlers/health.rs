//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

use super::super::state::AppState;
use super::super::types::{ApiResponse, DatabaseHealth, HealthResponse, PoolView, error_codes};

/// Service version with the build's git revision
pub fn version() -> String {
    format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"))
}

/// Health check endpoint
///
/// Pings the store and reports pool statistics for the PostgreSQL backend.
///
/// - Healthy: 200 OK + {code: 0, data: {status: "healthy", ...}}
/// - Unhealthy: 503 Service Unavailable + same payload with status "unhealthy"
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let healthy = match state.ledger.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(backend = state.backend.name(), error = ?e, "[HEALTH] Store ping failed");
            false
        }
    };

    let status = if healthy { "healthy" } else { "unhealthy" };
    let data = HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: version(),
        database: DatabaseHealth {
            status: status.to_string(),
            backend: state.backend.name().to_string(),
            pool: state.backend.pool_stats().map(|s| PoolView {
                size: s.size,
                idle: s.idle,
            }),
        },
    };

    if healthy {
        (StatusCode::OK, Json(ApiResponse::success(data)))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::with_code(
                error_codes::SERVICE_UNAVAILABLE,
                "unavailable",
                data,
            )),
        )
    }
}
