use redress_models::StageGraphError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RedressError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Invalid reference: {field} - {message}")]
    InvalidReference { field: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid transition from '{from}' to '{to}': {message}")]
    InvalidTransition {
        from: String,
        to: String,
        message: String,
    },

    #[error("Workflow instance {instance_id} is already finished")]
    InstanceFinished { instance_id: String },

    #[error("Concurrent modification of {resource}")]
    ConcurrentModification { resource: String },

    #[error("External dispatch error: {channel} - {message}")]
    ExternalDispatch { channel: String, message: String },

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Authorization error: {message}")]
    Authorization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl RedressError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_reference(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }

    pub fn instance_finished(instance_id: impl ToString) -> Self {
        Self::InstanceFinished {
            instance_id: instance_id.to_string(),
        }
    }

    pub fn concurrent_modification(resource: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            resource: resource.into(),
        }
    }

    pub fn external_dispatch(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalDispatch {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for errors produced by the instance state machine, which callers
    /// usually answer by re-reading the instance and its legal moves.
    pub fn is_state_machine_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::InstanceFinished { .. } | Self::ConcurrentModification { .. }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::InvalidReference { .. } => "INVALID_REFERENCE",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InstanceFinished { .. } => "INSTANCE_FINISHED",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::ExternalDispatch { .. } => "EXTERNAL_DISPATCH_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Database { .. } => 500,
            Self::Validation { .. } => 400,
            Self::InvalidReference { .. } => 422,
            Self::Conflict { .. } => 409,
            Self::InvalidTransition { .. } => 409,
            Self::InstanceFinished { .. } => 409,
            Self::ConcurrentModification { .. } => 409,
            Self::ExternalDispatch { .. } => 502,
            Self::Authentication { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::Configuration { .. } => 500,
            Self::NotFound { .. } => 404,
            Self::Internal { .. } => 500,
        }
    }
}

pub type RedressResult<T> = Result<T, RedressError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl From<RedressError> for ErrorResponse {
    fn from(error: RedressError) -> Self {
        let details = match &error {
            RedressError::Validation { field, .. } | RedressError::InvalidReference { field, .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            RedressError::InvalidTransition { from, to, .. } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        };
        Self {
            error: error.error_code().to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<StageGraphError> for RedressError {
    fn from(error: StageGraphError) -> Self {
        Self::validation("stages", error.to_string())
    }
}

// Conversion from common error types
impl From<mongodb::error::Error> for RedressError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::database(error.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for RedressError {
    fn from(error: mongodb::bson::ser::Error) -> Self {
        Self::database(format!("BSON serialization failed: {}", error))
    }
}

impl From<mongodb::bson::de::Error> for RedressError {
    fn from(error: mongodb::bson::de::Error) -> Self {
        Self::database(format!("BSON deserialization failed: {}", error))
    }
}

impl From<serde_json::Error> for RedressError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation("JSON", error.to_string())
    }
}

impl From<validator::ValidationErrors> for RedressError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation("model", crate::validation::format_validation_errors(&errors))
    }
}
