use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use labelbridge_printing::{Orientation, PrintRequest};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::state::AppState;

pub const API_NAME: &str = "Label Printer Automation API";
pub const ENDPOINTS: [&str; 3] = ["/print/<button_id>", "/status", "/health"];

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub message: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PrintQuery {
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrintResponse {
    pub success: bool,
    pub message: String,
    pub label_file: PathBuf,
    pub printer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: String,
    pub printer: String,
    pub button_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: API_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

/// Resolves the button, then runs the print on the blocking pool.
/// 解析按鈕對應後，在阻塞執行緒池上執行列印。
///
/// A timed-out dispatch keeps running in the background; only the response
/// reports failure.
pub async fn print_button(
    State(state): State<AppState>,
    Path(button_id): Path<String>,
    Query(query): Query<PrintQuery>,
) -> Result<Json<PrintResponse>> {
    let label_file = state.resolver.resolve(&button_id)?;
    let printer = state.resolver.selected_device()?;
    let orientation = query.orientation.unwrap_or(state.default_orientation);
    tracing::info!(%button_id, label = %label_file.display(), %printer, %orientation, "print requested");

    let request = PrintRequest::new(&label_file, &printer, orientation);
    let dispatcher = state.dispatcher.clone();
    let job = tokio::task::spawn_blocking(move || dispatcher.print(&request));

    let printed = match tokio::time::timeout(state.print_timeout, job).await {
        Ok(Ok(printed)) => printed,
        Ok(Err(join_error)) => return Err(GatewayError::Internal(join_error.to_string())),
        Err(_) => return Err(GatewayError::Timeout(state.print_timeout.as_secs())),
    };
    if !printed {
        return Err(GatewayError::PrintFailed(label_file));
    }

    tracing::info!(%button_id, label = %label_file.display(), "label printed");
    Ok(Json(PrintResponse {
        success: true,
        message: format!("Print job sent for button {button_id}"),
        label_file,
        printer,
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: "running".to_string(),
        printer: state.resolver.selected_device().unwrap_or_default(),
        button_count: state.resolver.mapping_count(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
