use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::any::Any;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::domain::AuctionId;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    // Handshake errors (4xx)
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("Missing or invalid notify secret")]
    Unauthorized,

    // Request errors (4xx)
    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Auction '{auction_id}' has ended")]
    AuctionClosed { auction_id: AuctionId },

    #[error("Unknown event type '{event_type}'")]
    UnknownEventType { event_type: String },

    #[error("Not allowed to {action}")]
    Forbidden { action: String },

    #[error("Connection is closed")]
    ConnectionClosed,

    // Infrastructure errors (5xx) - auto-converted
    #[error("Identity service error: {0}")]
    IdentityService(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl CoordinatorError {
    pub fn authentication(reason: impl Into<String>) -> Self {
        CoordinatorError::Authentication {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoordinatorError::Validation {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CoordinatorError::Authentication { .. } => "AUTHENTICATION_ERROR",
            CoordinatorError::Unauthorized => "UNAUTHORIZED",
            CoordinatorError::Validation { .. } => "VALIDATION_ERROR",
            CoordinatorError::AuctionClosed { .. } => "AUCTION_CLOSED",
            CoordinatorError::UnknownEventType { .. } => "UNKNOWN_EVENT_TYPE",
            CoordinatorError::Forbidden { .. } => "FORBIDDEN",
            CoordinatorError::ConnectionClosed => "CONNECTION_CLOSED",
            CoordinatorError::IdentityService(_) => "IDENTITY_SERVICE_ERROR",
            CoordinatorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Client errors
            CoordinatorError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            CoordinatorError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoordinatorError::Validation { .. } => StatusCode::BAD_REQUEST,
            CoordinatorError::UnknownEventType { .. } => StatusCode::BAD_REQUEST,
            CoordinatorError::AuctionClosed { .. } => StatusCode::CONFLICT,
            CoordinatorError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CoordinatorError::ConnectionClosed => StatusCode::GONE,
            // Server errors
            CoordinatorError::IdentityService(_) => StatusCode::BAD_GATEWAY,
            CoordinatorError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // For server errors, log the details but don't expose them
        let error_message = match &self {
            CoordinatorError::IdentityService(ref e) => {
                log::error!("Identity service error: {}", e);
                "Identity service unavailable".to_string()
            }
            CoordinatorError::Internal { ref message } => {
                log::error!("Internal error: {}", message);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

/// Render a handler panic as a 500 error body
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else {
        "unknown panic".to_string()
    };

    CoordinatorError::Internal {
        message: format!("handler panicked: {}", message),
    }
    .into_response()
}
