//! API error taxonomy and its OpenAI-shaped JSON rendering.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::envelope::EnvelopeError;

/// Errors surfaced to API callers.
///
/// Backend unavailability is deliberately absent: it is absorbed by the Blackbox client
/// and turned into a labelled mock completion.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unknown model: {0}")]
    ModelNotFound(String),

    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::ModelNotFound(_) => "invalid_request_error",
            ApiError::MalformedRequest(_) | ApiError::Internal(_) => "api_error",
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::ModelNotFound(_) => Some("model_not_found"),
            _ => None,
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.error_type(),
        });
        if let Some(code) = self.code() {
            error["code"] = serde_json::Value::from(code);
        }
        serde_json::json!({ "error": error })
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        ApiError::MalformedRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MalformedRequest(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!("Chat completion error: {}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }
        HttpResponse::build(self.status_code()).json(self.to_body())
    }
}
