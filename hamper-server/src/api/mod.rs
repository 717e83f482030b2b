//! HTTP API
//!
//! | Area | Routes | Guard |
//! |------|--------|-------|
//! | health | `GET /health` | none |
//! | auth | `/api/auth/*`, `/api/admin/auth/login` | rate limit |
//! | orders | `/api/orders*`, `/api/payments/confirm` | user token |
//! | admin | `/api/admin/orders/*`, `/api/admin/gateways*` | admin permission |
//! | webhooks | `/api/webhooks/stripe` | Stripe signature |

pub mod admin;
pub mod auth;
pub mod health;
pub mod orders;
pub mod webhooks;

use std::time::Duration;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Build a router with all routes registered (no tower middleware)
pub fn build_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router(state))
        .merge(orders::router(state))
        .merge(admin::router(state))
        .merge(webhooks::router())
}

/// Build the fully configured application
///
/// Used by the HTTP server and by tests driving the router directly.
pub fn build_app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    build_router(&state)
        // ========== Tower HTTP Middleware ==========
        .layer(TimeoutLayer::with_status_code(
            http::StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        // Request ID - generated per request and echoed in the response
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .with_state(state)
}
