use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hashmark_engine::EngineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Admin routes are unavailable until an admin key is configured
    #[error("admin key not configured")]
    AdminUnavailable,

    #[error("invalid admin key")]
    Forbidden,
}

/// Error body: `{ "error": ..., "code": ... }`
#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// The one mapping table from engine error kinds to HTTP status codes.
fn status_for_code(code: &str) -> StatusCode {
    match code {
        "VALIDATION" => StatusCode::BAD_REQUEST,
        "STATE_CONFLICT" => StatusCode::CONFLICT,
        "INSUFFICIENT_FUNDS" | "INSUFFICIENT_MARGIN" | "INSUFFICIENT_LIQUIDITY" => {
            StatusCode::BAD_REQUEST
        }
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "PRICE_EXCEEDED" => StatusCode::BAD_REQUEST,
        "TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl RpcError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.code(),
            Self::AdminUnavailable => "ADMIN_UNAVAILABLE",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Engine(e) => status_for_code(e.code()),
            Self::AdminUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forbidden => StatusCode::FORBIDDEN,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });
        (status, body).into_response()
    }
}
