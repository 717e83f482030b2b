//! Customer order endpoints (user access token required)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use shared::error::{AppError, AppResult};
use shared::models::{ConfirmPaymentRequest, Order, PlaceOrderRequest, PlaceOrderResponse};

use crate::auth::{AuthUser, require_user};
use crate::orders::CancelSource;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(place_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", post(cancel_order))
        .route("/api/payments/confirm", post(confirm_payment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user))
}

/// POST /api/orders
///
/// Placement runs on its own task: a request timeout or client disconnect
/// drops the response, never a half-finished placement.
pub async fn place_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<PlaceOrderResponse>)> {
    let service = state.orders.clone();
    let placed = tokio::spawn(async move { service.place_order(user.principal_id, req).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Order placement task failed");
            AppError::internal("Order placement aborted")
        })??;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.lifecycle.get_for_user(&id, user.principal_id).await?;
    Ok(Json(order))
}

/// POST /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .lifecycle
        .cancel(&id, CancelSource::Customer(user.principal_id))
        .await?;
    Ok(Json(order))
}

/// POST /api/payments/confirm
pub async fn confirm_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ConfirmPaymentRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .lifecycle
        .confirm_payment(user.principal_id, &req)
        .await?;
    Ok(Json(order))
}
