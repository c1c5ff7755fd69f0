use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("LLM service error: {0}")]
    LLMError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ErrorResponse {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| format!("{} not found", context.resource_type)),
                    )),
                )
            }
            ApiError::ValidationError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::BadRequest(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Bad request"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            ApiError::LLMError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "LLM service error"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(
                        context.user_friendly_message.unwrap_or_else(|| {
                            "AI service temporarily unavailable. Please try again.".to_string()
                        }),
                    )),
                )
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        "Database operation failed. Please try again.".to_string(),
                    )),
                )
            }
            ApiError::InternalError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Internal server error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        "An internal error occurred. Please try again.".to_string(),
                    )),
                )
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> ErrorResponse {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (not_found, $operation:expr, $resource_type:expr, $id:expr) => {
        $crate::errors::ApiError::NotFound(format!("{} with id '{}' not found", $resource_type, $id))
            .to_response_with_context(
                $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
            )
    };

    (validation, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::ValidationError($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (database, $operation:expr, $resource_type:expr, $id:expr, $error:expr) => {
        $crate::errors::classify_database_error(&$error).to_response_with_context(
            $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
        )
    };

    (llm, $operation:expr, $resource_type:expr, $error:expr) => {
        $crate::errors::ApiError::LLMError($error.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(anyhow::Error::from(err))
    }
}

/// Helper function to detect error types from anyhow error messages
pub fn classify_database_error(error: &anyhow::Error) -> ApiError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("not found") || error_str.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else if error_str.contains("required")
        || error_str.contains("cannot be null")
        || error_str.contains("not null constraint")
    {
        ApiError::ValidationError("Required field is missing or invalid".to_string())
    } else if error_str.contains("failed to decode") || error_str.contains("invalid type") {
        ApiError::InternalError("Stored roadmap could not be decoded".to_string())
    } else {
        ApiError::DatabaseError(anyhow::anyhow!("{}", error))
    }
}
