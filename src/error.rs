use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] DecodeError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger service error: {0}")]
    Ledger(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Resilient RPC execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC call failed after {attempts} attempts: {last_error}")]
    ExecutionExhausted { attempts: u32, last_error: String },
}

/// Oracle price account validation errors, checked in declaration order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("price account data too short: {len} bytes")]
    TooShort { len: usize },

    #[error("price feed not in trading status: {status}")]
    NotTrading { status: u8 },

    #[error("price feed is stale: {age_seconds} seconds old")]
    Stale { age_seconds: i64 },

    #[error("price feed confidence too wide: {confidence}")]
    LowConfidence { confidence: u64 },

    #[error("price exponent {exponent} cannot be scaled exactly")]
    PriceOutOfRange { exponent: i32 },
}

/// Inbound HMAC authentication failures.
///
/// These are logged with their specific reason but always surface to the
/// caller as a plain `Unauthorized`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing HMAC headers")]
    MissingHeaders,

    #[error("invalid timestamp header")]
    InvalidTimestamp,

    #[error("request expired ({age_ms} ms old)")]
    Expired { age_ms: i64 },

    #[error("signature mismatch")]
    BadSignature,

    #[error("unreadable request body")]
    UnreadableBody,
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
                None,
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg,
                None,
            ),
            AppError::InvalidAddress(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ADDRESS",
                msg,
                None,
            ),
            AppError::Oracle(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ORACLE_REJECTED",
                err.to_string(),
                None,
            ),
            AppError::Rpc(RpcError::ExecutionExhausted { attempts, last_error }) => (
                StatusCode::BAD_GATEWAY,
                "RPC_EXHAUSTED",
                format!("RPC call failed after {} attempts", attempts),
                Some(serde_json::json!({ "attempts": attempts, "last_error": last_error })),
            ),
            AppError::Chain(msg) => (
                StatusCode::BAD_GATEWAY,
                "CHAIN_ERROR",
                msg,
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Ledger(format!("HTTP request error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
