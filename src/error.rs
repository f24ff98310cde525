//! Common error types for the image generation orchestrator

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Coarse classification of a failed provider attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Loading, rate limited, unreachable or timed out
    Transient,
    /// Bad credentials, malformed request or corrupt response
    Permanent,
    /// Billing or credits exhausted
    QuotaExhausted,
}

impl FailureClass {
    /// How actionable a failure of this class is for the caller.
    /// Higher ranks win when picking the reason surfaced on exhaustion.
    pub fn rank(self) -> u8 {
        match self {
            Self::Transient => 0,
            Self::Permanent => 1,
            Self::QuotaExhausted => 2,
        }
    }
}

/// A failed attempt against one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub class: FailureClass,
    pub message: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.class {
            FailureClass::Transient => "transient failure",
            FailureClass::Permanent => "permanent failure",
            FailureClass::QuotaExhausted => "quota exhausted",
        };
        write!(f, "{} ({}): {}", self.provider, label, self.message)
    }
}

/// Terminal errors of a generation run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("No providers configured")]
    NoProvidersConfigured,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("All providers exhausted, last reason: {0}")]
    AllProvidersExhausted(ProviderFailure),

    #[error("Generation was cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::NoProvidersConfigured => "no_providers_configured",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::AllProvidersExhausted(_) => "all_providers_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response format (OpenAI compatible)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "provider_error", None),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
            AppError::Generation(e) => {
                let (status, kind) = match e {
                    GenerationError::EmptyPrompt => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                    GenerationError::UnknownProvider(_) => (StatusCode::NOT_FOUND, "not_found_error"),
                    GenerationError::NoProvidersConfigured => (StatusCode::SERVICE_UNAVAILABLE, "server_error"),
                    GenerationError::AllProvidersExhausted(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
                    GenerationError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "server_error"),
                };
                (status, kind, Some(e.code()))
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }

    /// Build the JSON error body for this error
    pub fn to_error_response(&self) -> ErrorResponse {
        let (_, error_type, code) = self.classify();
        ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_error_response())).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
