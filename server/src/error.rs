use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::clients::ClientError;
use crate::schema::{Issue, SchemaError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session not found or expired")]
    InvalidSession,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Accounting integration is not connected")]
    AccountingNotConnected,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Validation failed")]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Business { status: StatusCode, message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Accounting provider error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn business(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Business {
            status,
            message: message.into(),
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Invalid(validation) => ApiError::Validation(validation),
            SchemaError::Shape(inner) => {
                ApiError::Internal(format!("schema does not match target type: {}", inner))
            }
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for ApiError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        ApiError::Internal(format!("bson serialization error: {}", err))
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [Issue]>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InvalidSession => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccountingNotConnected => StatusCode::UNAUTHORIZED,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Business { status, .. } => *status,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Internal detail stays in the server log, never in the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("internal error: {:?}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let fields = match self {
            ApiError::Validation(validation) => Some(validation.issues.as_slice()),
            _ => None,
        };

        HttpResponse::build(status).json(ErrorResponse {
            success: false,
            error: message,
            fields,
        })
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
