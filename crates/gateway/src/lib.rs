//! HTTP front end that turns button presses into print jobs.
//! 將按鈕請求轉換為列印作業的 HTTP 介面。

pub mod error;
pub mod routes;
pub mod state;

use std::io;
use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use error::GatewayError;
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route(
            "/print/:button_id",
            get(routes::print_button).post(routes::print_button),
        )
        .route("/status", get(routes::status))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `host:port` and serves until the process is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!("label bridge listening on {addr}");
    tracing::info!("  - GET|POST /print/:button_id");
    tracing::info!("  - GET      /status");
    tracing::info!("  - GET      /health");
    axum::serve(listener, build_router(state)).await
}
