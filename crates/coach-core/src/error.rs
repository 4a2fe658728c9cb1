//! Error types for coaching engine operations.
//!
//! Errors carry a structured [`ErrorCode`] so callers (the HTTP layer, the
//! orchestrator's counters) can react programmatically without string matching.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for coaching engine operations.
pub type CoachResult<T> = Result<T, CoachError>;

/// Main error type for all coaching engine operations.
#[derive(Error, Debug)]
pub enum CoachError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// A referenced entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_id: Option<String>,
    },

    /// A message status change violates the lifecycle.
    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String, code: ErrorCode },

    /// The behavioral predictor failed or returned unusable data.
    #[error("Prediction error: {message}")]
    Prediction {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A message could not be composed from its template.
    #[error("Composition error: {message}")]
    Composition { message: String, code: ErrorCode },

    /// The notification transport rejected or failed a delivery.
    #[error("Delivery error: {message}")]
    Delivery {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValOutOfRange,

    // Not found (NF_xxx)
    NfMessage,
    NfUser,
    NfTemplate,

    // Lifecycle (MSG_xxx)
    MsgInvalidTransition,

    // Prediction (PRED_xxx)
    PredUnavailable,
    PredInvalidResponse,

    // Composition (CMP_xxx)
    CmpMissingPlaceholder,
    CmpNoTemplate,

    // Delivery (DLV_xxx)
    DlvTransportFailed,
    DlvRejected,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidTimestamp,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValOutOfRange => "VAL_003",
            ErrorCode::NfMessage => "NF_001",
            ErrorCode::NfUser => "NF_002",
            ErrorCode::NfTemplate => "NF_003",
            ErrorCode::MsgInvalidTransition => "MSG_001",
            ErrorCode::PredUnavailable => "PRED_001",
            ErrorCode::PredInvalidResponse => "PRED_002",
            ErrorCode::CmpMissingPlaceholder => "CMP_001",
            ErrorCode::CmpNoTemplate => "CMP_002",
            ErrorCode::DlvTransportFailed => "DLV_001",
            ErrorCode::DlvRejected => "DLV_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidTimestamp => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl CoachError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error for a value outside its allowed range.
    pub fn out_of_range(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let mut details = HashMap::new();
        details.insert("field".to_string(), field.clone());
        Self::Validation {
            message: format!("{}: {}", field, message.into()),
            code: ErrorCode::ValOutOfRange,
            details,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a message-not-found error.
    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        let id = message_id.into();
        Self::NotFound {
            message: format!("Message with id '{}' not found", id),
            code: ErrorCode::NfMessage,
            entity_id: Some(id),
        }
    }

    /// Create a user-not-found error.
    pub fn user_not_found(user_id: impl Into<String>) -> Self {
        let id = user_id.into();
        Self::NotFound {
            message: format!("User with id '{}' not found", id),
            code: ErrorCode::NfUser,
            entity_id: Some(id),
        }
    }

    /// Create an invalid lifecycle transition error.
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            message: format!("cannot move message from '{}' to '{}'", from, to),
            code: ErrorCode::MsgInvalidTransition,
        }
    }

    /// Create a prediction error.
    pub fn prediction(message: impl Into<String>) -> Self {
        Self::Prediction {
            message: message.into(),
            code: ErrorCode::PredUnavailable,
            source: None,
        }
    }

    /// Create a composition error for a placeholder with no context value.
    pub fn missing_placeholder(key: impl Into<String>) -> Self {
        Self::Composition {
            message: format!("no value for placeholder '{{{}}}'", key.into()),
            code: ErrorCode::CmpMissingPlaceholder,
        }
    }

    /// Create a composition error for a type with neither template nor fallback.
    pub fn no_template(message_type: impl std::fmt::Display) -> Self {
        Self::Composition {
            message: format!("no eligible template or fallback for '{}'", message_type),
            code: ErrorCode::CmpNoTemplate,
        }
    }

    /// Create a delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            code: ErrorCode::DlvTransportFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a timestamp parse error.
    pub fn timestamp(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidTimestamp,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create an API (network) error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::InvalidTransition { code, .. } => *code,
            Self::Prediction { code, .. } => *code,
            Self::Composition { code, .. } => *code,
            Self::Delivery { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Network { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether a later attempt at the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Delivery { .. } | Self::Prediction { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::NotFound { code: ErrorCode::NfMessage, .. } => {
                Some("Please check the message ID and ensure it exists")
            }
            Self::NotFound { .. } => Some("Please check the identifier and ensure it exists"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::InvalidTransition { .. } => {
                Some("Only sent or read messages accept read, act, dismiss or snooze interactions")
            }
            Self::Prediction { .. } => Some("Please check the predictor endpoint configuration"),
            Self::Delivery { .. } => Some("The message stays queued and is retried on the next poll"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoachError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = CoachError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_out_of_range_records_field() {
        let err = CoachError::out_of_range("quiet_hours", "hour 24 is not in 0..=23");
        assert_eq!(err.code(), ErrorCode::ValOutOfRange);
        match err {
            CoachError::Validation { details, .. } => {
                assert_eq!(details.get("field").map(String::as_str), Some("quiet_hours"));
            }
            _ => panic!("expected validation error"),
        }
    }

    #[test]
    fn test_not_found_error() {
        let err = CoachError::message_not_found("msg-1");
        assert_eq!(err.code(), ErrorCode::NfMessage);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_missing_placeholder_message() {
        let err = CoachError::missing_placeholder("current_streak");
        assert_eq!(err.code(), ErrorCode::CmpMissingPlaceholder);
        assert!(err.to_string().contains("{current_streak}"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoachError::delivery("push gateway down").is_transient());
        assert!(!CoachError::validation("bad").is_transient());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ValInvalidInput.as_str(), "VAL_001");
        assert_eq!(ErrorCode::MsgInvalidTransition.as_str(), "MSG_001");
    }
}
