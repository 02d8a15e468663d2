use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Wallet not configured: {wallet}")]
    NotConfigured {
        wallet: String,
        configured: Vec<String>,
    },

    #[error("Data not yet available for {wallet}")]
    NotYetCached {
        wallet: String,
        configured: Vec<String>,
    },

    #[error("Missing parameter: {param}")]
    MissingParam {
        param: String,
        configured: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    configured_addresses: Option<Vec<String>>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<&'static str>, Option<Vec<String>>) {
        match self {
            AppError::NotConfigured { configured, .. } => (
                StatusCode::NOT_FOUND,
                "WALLET_NOT_CONFIGURED",
                Some("This wallet address is not in the configured list."),
                Some(configured.clone()),
            ),
            AppError::NotYetCached { configured, .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_YET_CACHED",
                Some("This wallet is configured but data is still being collected. Please try again in a moment."),
                Some(configured.clone()),
            ),
            AppError::MissingParam { configured, .. } => (
                StatusCode::BAD_REQUEST,
                "MISSING_PARAM",
                Some("Please provide a wallet address."),
                Some(configured.clone()),
            ),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", None, None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None, None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, configured_addresses) = self.parts();

        match &self {
            AppError::NotConfigured { wallet, .. } => {
                tracing::info!(wallet = %wallet, error_code = code, "Wallet not configured");
            }
            AppError::NotYetCached { wallet, .. } => {
                tracing::info!(wallet = %wallet, error_code = code, "Wallet configured but not cached yet");
            }
            AppError::MissingParam { param, .. } => {
                tracing::warn!(param = %param, error_code = code, "Missing parameter");
            }
            AppError::Config(msg) => {
                tracing::error!(message = %msg, error_code = code, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(message = %msg, error_code = code, "Internal error occurred");
            }
        }

        tracing::debug!(
            status_code = %status.as_u16(),
            error_code = %code,
            error_message = %self,
            "Returning error response"
        );

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            message,
            configured_addresses,
        });

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
