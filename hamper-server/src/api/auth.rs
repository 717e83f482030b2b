//! Login, refresh and logout

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::post,
};
use shared::error::AppResult;
use shared::models::{AdminLoginRequest, RefreshRequest, TokenPair, UserLoginRequest};

use crate::auth::rate_limit::{login_rate_limit, refresh_rate_limit};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let login = Router::new()
        .route("/api/auth/login", post(user_login))
        .route("/api/admin/auth/login", post(admin_login))
        .route_layer(middleware::from_fn_with_state(state.clone(), login_rate_limit));

    let refresh = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), refresh_rate_limit));

    login.merge(refresh)
}

/// POST /api/auth/login
pub async fn user_login(
    State(state): State<AppState>,
    Json(req): Json<UserLoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state.sessions.login_user(&req.email, &req.password).await?;
    Ok(Json(pair))
}

/// POST /api/admin/auth/login
pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state.sessions.login_admin(&req.username, &req.password).await?;
    Ok(Json(pair))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(pair))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    state.sessions.logout(&req.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
