use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{require_api_key, AuthGate};
use crate::error::ApiError;
use crate::relay::{iso_timestamp, AggregateResult, DeliveryRequest, Relay};

// ── Shared state ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthGate>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(auth: AuthGate, relay: Relay) -> Self {
        Self {
            auth: Arc::new(auth),
            relay: Arc::new(relay),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/send", post(send_message))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            require_api_key,
        ));

    Router::new()
        .route("/", get(health))
        .merge(protected)
        .with_state(state)
}

// ── Request body ───────────────────────────────────────────────────────────────

/// A raw body field: JSON booleans, strings (JSON or form) or anything else
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Flag(bool),
    Text(String),
    Other(IgnoredAny),
}

impl FieldValue {
    /// `true`/`"true"` and `false`/`"false"`; anything else has no opinion
    fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(flag) => Some(*flag),
            FieldValue::Text(text) if text == "true" => Some(true),
            FieldValue::Text(text) if text == "false" => Some(false),
            _ => None,
        }
    }

    fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

fn flag(value: Option<&FieldValue>, default: bool) -> bool {
    value.and_then(FieldValue::as_flag).unwrap_or(default)
}

#[derive(Debug, Default, Deserialize)]
struct SendBody {
    message: Option<FieldValue>,
    username: Option<FieldValue>,
    send_telegram: Option<FieldValue>,
    use_bot: Option<FieldValue>,
    embed: Option<FieldValue>,
}

impl SendBody {
    /// Validate and coerce flags. This is the only place booleans are interpreted.
    fn into_request(self) -> Result<DeliveryRequest, ApiError> {
        let message = self
            .message
            .and_then(FieldValue::into_text)
            .filter(|m| !m.is_empty())
            .ok_or(ApiError::MissingMessage)?;

        Ok(DeliveryRequest {
            message,
            username: self
                .username
                .and_then(FieldValue::into_text)
                .filter(|u| !u.is_empty()),
            send_telegram: flag(self.send_telegram.as_ref(), false),
            prefer_bot: flag(self.use_bot.as_ref(), true),
            embed: flag(self.embed.as_ref(), false),
        })
    }
}

/// JSON or form-encoded body. Other content types read as an empty body.
struct SendPayload(SendBody);

impl<S> FromRequest<S> for SendPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<SendBody>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidBody(e.body_text()))?;
            Ok(Self(body))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<SendBody>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidBody(e.body_text()))?;
            Ok(Self(body))
        } else {
            Ok(Self(SendBody::default()))
        }
    }
}

// ── Handlers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DiscordStatus {
    bot: bool,
    webhook: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    auth: bool,
    discord: DiscordStatus,
    telegram: bool,
    #[serde(serialize_with = "iso_timestamp")]
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "running",
        auth: state.auth.is_enabled(),
        discord: DiscordStatus {
            bot: state.relay.bot_ready(),
            webhook: state.relay.webhook_configured(),
        },
        telegram: state.relay.telegram_configured(),
        timestamp: Utc::now(),
    })
}

fn preview(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

async fn send_message(
    State(state): State<AppState>,
    SendPayload(body): SendPayload,
) -> Result<(StatusCode, Json<AggregateResult>), ApiError> {
    let request = body.into_request().inspect_err(|_| {
        warn!("No message provided");
    })?;

    info!("Received message: {}...", preview(&request.message, 50));

    let outcome = state.relay.deliver(&request).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(outcome)))
}
