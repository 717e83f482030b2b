//! Back-office endpoints (admin access token + permission)

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, patch, post, put},
};
use shared::error::{AppError, AppResult};
use shared::models::{
    GatewayKind, GatewayStatus, GatewayToggleRequest, Order, Permission, RefundRequest,
    UpdateStatusRequest,
};

use crate::auth::{AuthAdmin, require_admin};
use crate::security_log;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let orders = Router::new()
        .route("/api/admin/orders/{id}", get(get_order))
        .route("/api/admin/orders/{id}/refund", post(refund_order))
        .route("/api/admin/orders/{id}/status", patch(update_status))
        .route("/api/admin/gateways", get(list_gateways))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin(&[Permission::OrderManager]),
        ));

    let gateways = Router::new()
        .route("/api/admin/gateways/{name}", put(toggle_gateway))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin(&[Permission::SuperAdmin]),
        ));

    orders.merge(gateways)
}

/// GET /api/admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.lifecycle.get(&id).await?))
}

/// POST /api/admin/orders/{id}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    AuthAdmin(admin): AuthAdmin,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> AppResult<Json<Order>> {
    security_log!(
        INFO,
        "refund_requested",
        admin_id = admin.id,
        username = %admin.username,
        order_id = %id
    );
    let order = state.lifecycle.refund(&id, &req, admin.id).await?;
    Ok(Json(order))
}

/// PATCH /api/admin/orders/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    AuthAdmin(admin): AuthAdmin,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state.lifecycle.advance(&id, req.status, admin.id).await?;
    Ok(Json(order))
}

/// GET /api/admin/gateways
pub async fn list_gateways(State(state): State<AppState>) -> Json<Vec<GatewayStatus>> {
    Json(state.gateways.statuses())
}

/// PUT /api/admin/gateways/{name}
pub async fn toggle_gateway(
    State(state): State<AppState>,
    AuthAdmin(admin): AuthAdmin,
    Path(name): Path<String>,
    Json(req): Json<GatewayToggleRequest>,
) -> AppResult<Json<GatewayStatus>> {
    let kind = GatewayKind::parse(&name)
        .ok_or_else(|| AppError::not_found(format!("Payment gateway {name}")))?;
    let status = state.gateways.set_enabled(kind, req.enabled)?;
    security_log!(
        INFO,
        "gateway_toggled",
        admin_id = admin.id,
        gateway = %kind,
        enabled = req.enabled
    );
    Ok(Json(status))
}
