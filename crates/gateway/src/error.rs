use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labelbridge_settings::ResolveError;
use serde_json::json;

/// Failures of a print request, mapped onto HTTP statuses.
/// 列印請求的失敗類型，對應到 HTTP 狀態碼。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Button ID \"{0}\" not configured")]
    NotConfigured(String),

    #[error("No printer selected")]
    NoPrinterSelected,

    #[error("Failed to print label: {}", .0.display())]
    PrintFailed(PathBuf),

    #[error("Print job did not finish within {0} seconds")]
    Timeout(u64),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ResolveError> for GatewayError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotConfigured(button_id) => Self::NotConfigured(button_id),
            ResolveError::Unset => Self::NoPrinterSelected,
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured(_) => StatusCode::NOT_FOUND,
            Self::NoPrinterSelected | Self::PrintFailed(_) | Self::Timeout(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::NotConfigured(_) => tracing::warn!("{self}"),
            _ => tracing::error!("{self}"),
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
