//! API error types and their HTTP mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{scheduler::SchedulerError, server::ApiResponse};

/// Errors surfaced by the HTTP layer
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed; maps to 400.
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The addressed resource does not exist; maps to 404.
    #[error("{0}")]
    NotFound(String),

    /// Anything else; maps to 500.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Failed to bind the listen address at startup.
    #[error("Failed to bind API server to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// The server loop failed at runtime.
    #[error("API server error: {0}")]
    Server(String),
}

impl ApiError {
    /// Build a bad-request error without field details
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Validation { field, message } => Self::BadRequest {
                message,
                details: Some(serde_json::json!({ "field": field })),
            },
            SchedulerError::NoNewDispatches => Self::bad_request(error.to_string()),
            SchedulerError::Store(e) => Self::Internal(e.to_string()),
            SchedulerError::Queue(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<reach_store::StoreError> for ApiError {
    fn from(error: reach_store::StoreError) -> Self {
        match error {
            reach_store::StoreError::CampaignNotFound(id) => {
                Self::NotFound(format!("Campaign not found: {id}"))
            }
            reach_store::StoreError::DispatchNotFound(id) => {
                Self::NotFound(format!("Dispatch not found: {id}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) | Self::Bind { .. } | Self::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let details = match &self {
            Self::BadRequest { details, .. } => details.clone(),
            _ => None,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }

        (
            status,
            Json(ApiResponse::<()>::failure(self.to_string(), details)),
        )
            .into_response()
    }
}
