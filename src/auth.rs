use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::error::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared-secret check for protected routes. With no secret configured every
/// request is let through.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    api_key: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// `X-API-Key`, else `Authorization` with any `Bearer ` prefix removed
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, API_KEY_HEADER).or_else(|| {
        header_str(headers, AUTHORIZATION.as_str())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
            .filter(|v| !v.is_empty())
    })
}

fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl AuthGate {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = self.api_key.as_deref() else {
            warn!("API_KEY not set - running without authentication!");
            return Ok(());
        };

        let Some(presented) = presented_key(headers) else {
            error!("Request without API key");
            return Err(ApiError::MissingApiKey);
        };

        if !keys_match(presented, expected) {
            let prefix: String = presented.chars().take(8).collect();
            error!("Invalid API key attempt: {}...", prefix);
            return Err(ApiError::InvalidApiKey);
        }

        Ok(())
    }
}

/// Middleware for `from_fn_with_state`
pub async fn require_api_key(
    State(gate): State<Arc<AuthGate>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate.check(req.headers())?;
    Ok(next.run(req).await)
}
