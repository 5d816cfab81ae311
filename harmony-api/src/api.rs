//! API routes definition

use crate::error::ApiError;
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use harmony_core::ErrorKind;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Build the API router with all endpoints
pub fn build_router(state: AppState) -> Router {
    let request_timeout = state.harmony.config.server.request_timeout;

    Router::new()
        .route("/health", get(handlers::health))
        // Account routes
        .route("/accounts", post(handlers::register_account))
        .route(
            "/accounts/:id",
            get(handlers::get_account)
                .patch(handlers::update_account)
                .delete(handlers::delete_account),
        )
        // Community routes
        .route("/communities", post(handlers::create_community))
        .route(
            "/communities/:id",
            get(handlers::get_community)
                .patch(handlers::update_community)
                .delete(handlers::delete_community),
        )
        // Membership routes
        .route("/communities/:id/invite", get(handlers::create_invite))
        .route("/communities/:id/join", post(handlers::join_community))
        .route("/communities/:id/leave", post(handlers::leave_community))
        .layer(middleware::from_fn_with_state(request_timeout, enforce_deadline))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer 504 when a request outlives its budget
///
/// The handler runs as its own task and is left to finish after the 504, so
/// a membership write is never cut off between its two sides.
async fn enforce_deadline(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let mut handler = tokio::spawn(next.run(request));

    match tokio::time::timeout(limit, &mut handler).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => ApiError::new(ErrorKind::Internal, format!("handler failed: {}", e)).into_response(),
        Err(_) => {
            warn!(%method, path = %path, limit_ms = limit.as_millis() as u64, "Request deadline passed, handler left running");
            ApiError::new(
                ErrorKind::Timeout,
                format!("request exceeded {}ms", limit.as_millis()),
            )
            .into_response()
        }
    }
}
