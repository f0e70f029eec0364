use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures that end the request before any delivery
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key required")]
    MissingApiKey,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Message is required")]
    MissingMessage,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey => StatusCode::UNAUTHORIZED,
            ApiError::InvalidApiKey => StatusCode::FORBIDDEN,
            ApiError::MissingMessage | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        if matches!(self, ApiError::MissingApiKey) {
            body["message"] = json!("Please provide API key in X-API-Key header");
        }
        (self.status(), Json(body)).into_response()
    }
}
