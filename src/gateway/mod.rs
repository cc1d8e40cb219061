//! HTTP gateway
//!
//! ```text
//! /health                                  GET   store ping + pool stats
//! /v1/accounts                             POST  open account
//! /v1/accounts/{id}                        GET   account, or balance with ?at=
//! /v1/accounts/{id}/transactions           GET   paginated history
//! /v1/transactions                         POST  transfer, deposit or bulk
//! /v1/transactions/{id}                    GET   transfer by id
//! /v1/transactions/reference/{reference}   GET   transfer by client reference
//! ```

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;
use types::{ApiError, error_codes};

/// Bound every request by the configured timeout
async fn request_timeout_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                %method,
                path = %path,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Request timed out"
            );
            ApiError::new(
                StatusCode::REQUEST_TIMEOUT,
                error_codes::REQUEST_TIMEOUT,
                "request timed out",
            )
            .into_response()
        }
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/{id}", get(handlers::get_account))
        .route(
            "/accounts/{id}/transactions",
            get(handlers::list_account_transactions),
        )
        .route("/transactions", post(handlers::create_transaction))
        .route("/transactions/{id}", get(handlers::get_transaction))
        .route(
            "/transactions/reference/{reference}",
            get(handlers::get_transaction_by_reference),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", v1)
        .layer(from_fn_with_state(
            state.clone(),
            request_timeout_middleware,
        ))
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn run_server(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!(
            addr = %addr,
            error = %e,
            "Failed to bind; port {} may already be in use",
            port
        );
    })?;

    tracing::info!(addr = %addr, "Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}
