pub mod discord;
pub mod telegram;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::Serialize;

/// How a message reached its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Bot,
    Embed,
    Webhook,
    None,
}

/// Normalized outcome of a single channel send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub method: DeliveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn sent(method: DeliveryMethod) -> Self {
        Self {
            success: true,
            method,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            method: DeliveryMethod::None,
            error: Some(error.into()),
        }
    }
}

/// Per-request options passed through to every sender
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Display name for the webhook post and the embed title
    pub username: Option<String>,
    /// Ask for a rich embed card (bot channel only)
    pub embed: bool,
}

/// One outbound notification channel.
///
/// Implementations never fail: transport errors, bad statuses and missing
/// configuration all come back as a failed [`DeliveryResult`].
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn send(&self, message: &str, options: &SendOptions) -> DeliveryResult;
}
