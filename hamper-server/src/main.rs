//! hamper-server: storefront order and payment service
//!
//! Long-running service that:
//! - Places orders against a race-free inventory ledger
//! - Opens and settles payments through Razorpay or Stripe
//! - Drives the order state machine (confirmation, fulfilment, refunds)
//! - Cancels unpaid orders in the background

use std::net::SocketAddr;

use hamper_server::{AppState, BoxError, Config, api, logger};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    logger::init_logger_with_file(
        &config.log_level,
        config.log_json,
        config.log_dir.as_deref(),
    )?;

    tracing::info!("Starting hamper-server (env: {})", config.environment);

    let http_port = config.http_port;
    let state = AppState::connect(config).await?;
    state.spawn_background_tasks();

    let app = api::build_app(state);

    let http_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("hamper-server HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("hamper-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
