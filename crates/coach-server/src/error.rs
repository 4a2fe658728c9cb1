//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coach_core::error::CoachError;
use serde::Serialize;
use std::fmt;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // Common error constructors
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<CoachError> for ApiError {
    fn from(err: CoachError) -> Self {
        let code = err.code().as_str();
        let suggestion = err.suggestion().map(str::to_string);
        let api = match &err {
            CoachError::NotFound { message, .. } => {
                ApiError::new(StatusCode::NOT_FOUND, code, message.clone())
            }
            CoachError::Validation { message, details, .. } => {
                let api = ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, code, message.clone());
                if details.is_empty() {
                    api
                } else {
                    api.with_details(serde_json::json!(details))
                }
            }
            CoachError::InvalidTransition { message, .. } => {
                ApiError::new(StatusCode::CONFLICT, code, message.clone())
            }
            CoachError::Configuration(msg) => ApiError::bad_request(msg.clone()),
            CoachError::UnsupportedProvider { provider } => {
                ApiError::bad_request(format!("Unsupported provider: {}", provider))
            }
            CoachError::Prediction { message, .. }
            | CoachError::Delivery { message, .. }
            | CoachError::Network { message, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, code, message.clone())
            }
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, other.to_string()),
        };
        match suggestion {
            Some(hint) if api.details.is_none() => {
                api.with_details(serde_json::json!({ "suggestion": hint }))
            }
            _ => api,
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
