use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::OptionFuture;
use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::platform::discord::{BotSender, DiscordSession, WebhookSender};
use crate::platform::telegram::TelegramSender;
use crate::platform::{ChannelSender, DeliveryResult, SendOptions};

/// A validated `POST /send` request
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub message: String,
    pub username: Option<String>,
    pub send_telegram: bool,
    pub prefer_bot: bool,
    pub embed: bool,
}

/// Per-channel outcome. `telegram` stays `None` unless it was requested.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelResults {
    pub discord: Option<DeliveryResult>,
    pub telegram: Option<DeliveryResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub success: bool,
    pub results: ChannelResults,
    #[serde(serialize_with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn iso_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Fans a message out to Discord (bot, falling back to webhook) and,
/// on request, Telegram.
pub struct Relay {
    bot: Option<BotSender>,
    webhook: WebhookSender,
    telegram: TelegramSender,
}

impl Relay {
    pub fn new(bot: Option<BotSender>, webhook: WebhookSender, telegram: TelegramSender) -> Self {
        Self {
            bot,
            webhook,
            telegram,
        }
    }

    /// Build all senders from configuration. A bot that fails to log in is
    /// logged and left out; the rest of the relay keeps working.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let discord = &config.discord;

        let bot = match discord.bot_credentials() {
            Some((token, channel_id)) => match DiscordSession::connect(token).await {
                Ok(session) => Some(BotSender::new(
                    Arc::new(session),
                    channel_id,
                    discord.default_username.clone(),
                )),
                Err(e) => {
                    error!("Discord bot login failed: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let webhook = WebhookSender::new(discord.webhook_url.clone(), discord.default_username.clone());
        let telegram = TelegramSender::new(&config.telegram)?;

        Ok(Self::new(bot, webhook, telegram))
    }

    pub fn bot_ready(&self) -> bool {
        self.bot.as_ref().is_some_and(BotSender::is_ready)
    }

    pub fn webhook_configured(&self) -> bool {
        self.webhook.is_configured()
    }

    pub fn telegram_configured(&self) -> bool {
        self.telegram.is_configured()
    }

    /// The bot, when it is preferred and its session is ready
    fn preferred_bot(&self, prefer_bot: bool) -> Option<&BotSender> {
        self.bot
            .as_ref()
            .filter(|bot| prefer_bot && bot.is_ready())
    }

    /// Bot first when preferred and ready; the webhook is always the last word
    pub async fn deliver_discord(
        &self,
        message: &str,
        options: &SendOptions,
        prefer_bot: bool,
    ) -> DeliveryResult {
        if let Some(bot) = self.preferred_bot(prefer_bot) {
            let result = bot.send(message, options).await;
            if result.success {
                return result;
            }
            warn!("Discord {} failed, trying {}...", bot.name(), self.webhook.name());
        }

        self.webhook.send(message, options).await
    }

    pub async fn deliver(&self, request: &DeliveryRequest) -> AggregateResult {
        let options = SendOptions {
            username: request.username.clone(),
            embed: request.embed,
        };

        let telegram: OptionFuture<_> = request
            .send_telegram
            .then(|| self.telegram.send(&request.message, &options))
            .into();

        let (discord, telegram) = tokio::join!(
            self.deliver_discord(&request.message, &options, request.prefer_bot),
            telegram
        );

        let success = discord.success || telegram.as_ref().is_some_and(|r| r.success);
        if success {
            info!("Delivery succeeded");
        } else {
            warn!("All attempted channels failed");
        }

        AggregateResult {
            success,
            results: ChannelResults {
                discord: Some(discord),
                telegram,
            },
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;
    use crate::platform::discord::{BotSession, DEFAULT_USERNAME};
    use crate::platform::mock::MockSession;
    use crate::platform::DeliveryMethod;
    use serde_json::json;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    fn request(message: &str) -> DeliveryRequest {
        DeliveryRequest {
            message: message.to_string(),
            username: None,
            send_telegram: false,
            prefer_bot: true,
            embed: false,
        }
    }

    fn bot(session: &Arc<MockSession>) -> Option<BotSender> {
        Some(BotSender::new(
            Arc::clone(session) as Arc<dyn BotSession>,
            "1",
            DEFAULT_USERNAME,
        ))
    }

    async fn webhook_server(status: u16, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn no_telegram() -> TelegramSender {
        TelegramSender::new(&TelegramConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_bot_success_skips_webhook() {
        let server = webhook_server(204, 0).await;
        let session = Arc::new(MockSession::ready());
        let relay = Relay::new(
            bot(&session),
            WebhookSender::new(Some(server.uri()), DEFAULT_USERNAME),
            no_telegram(),
        );

        let outcome = relay.deliver(&request("hello")).await;
        assert!(outcome.success);
        assert_eq!(
            outcome.results.discord,
            Some(DeliveryResult::sent(DeliveryMethod::Bot))
        );
        assert!(outcome.results.telegram.is_none());
        assert_eq!(session.send_count(), 1);
    }

    #[tokio::test]
    async fn test_bot_not_ready_uses_webhook() {
        let server = webhook_server(204, 1).await;
        let session = Arc::new(MockSession::default());
        let relay = Relay::new(
            bot(&session),
            WebhookSender::new(Some(server.uri()), DEFAULT_USERNAME),
            no_telegram(),
        );

        let outcome = relay.deliver(&request("hello")).await;
        assert_eq!(
            outcome.results.discord,
            Some(DeliveryResult::sent(DeliveryMethod::Webhook))
        );
        assert_eq!(session.send_count(), 0);
    }

    #[tokio::test]
    async fn test_bot_failure_falls_back_to_webhook() {
        let server = webhook_server(200, 1).await;
        let session = Arc::new(MockSession {
            fail_send: true,
            ..MockSession::ready()
        });
        let relay = Relay::new(
            bot(&session),
            WebhookSender::new(Some(server.uri()), DEFAULT_USERNAME),
            no_telegram(),
        );

        let result = relay
            .deliver_discord("hello", &SendOptions::default(), true)
            .await;
        assert_eq!(result.method, DeliveryMethod::Webhook);
        assert_eq!(session.send_count(), 1);
    }

    #[tokio::test]
    async fn test_bot_failure_without_webhook_reports_webhook_error() {
        let session = Arc::new(MockSession {
            fail_send: true,
            ..MockSession::ready()
        });
        let relay = Relay::new(bot(&session), WebhookSender::new(None, DEFAULT_USERNAME), no_telegram());

        let result = relay
            .deliver_discord("hello", &SendOptions::default(), true)
            .await;
        assert_eq!(result, DeliveryResult::failed("Webhook not configured"));
        assert_eq!(session.send_count(), 1);
    }

    #[tokio::test]
    async fn test_prefer_bot_false_goes_straight_to_webhook() {
        let server = webhook_server(204, 1).await;
        let session = Arc::new(MockSession::ready());
        let relay = Relay::new(
            bot(&session),
            WebhookSender::new(Some(server.uri()), DEFAULT_USERNAME),
            no_telegram(),
        );

        let result = relay
            .deliver_discord("hello", &SendOptions::default(), false)
            .await;
        assert!(result.success);
        assert_eq!(session.send_count(), 0);
    }

    #[tokio::test]
    async fn test_embed_without_bot_degrades_to_webhook_text() {
        let server = webhook_server(204, 1).await;
        let relay = Relay::new(
            None,
            WebhookSender::new(Some(server.uri()), DEFAULT_USERNAME),
            no_telegram(),
        );

        let options = SendOptions {
            username: Some("ci".into()),
            embed: true,
        };
        let result = relay.deliver_discord("hello", &options, true).await;
        assert_eq!(result, DeliveryResult::sent(DeliveryMethod::Webhook));
    }

    #[tokio::test]
    async fn test_nothing_configured_fails() {
        let relay = Relay::new(None, WebhookSender::new(None, DEFAULT_USERNAME), no_telegram());

        let outcome = relay.deliver(&request("hello")).await;
        assert!(!outcome.success);
        let discord = outcome.results.discord.unwrap();
        assert!(!discord.success);
        assert_eq!(discord.error.as_deref(), Some("Webhook not configured"));
    }

    #[tokio::test]
    async fn test_telegram_requested_but_unconfigured_is_reported() {
        let relay = Relay::new(None, WebhookSender::new(None, DEFAULT_USERNAME), no_telegram());

        let mut req = request("hello");
        req.send_telegram = true;
        let outcome = relay.deliver(&req).await;
        assert_eq!(
            outcome.results.telegram,
            Some(DeliveryResult::failed("Not configured"))
        );
    }

    #[tokio::test]
    async fn test_telegram_success_rescues_discord_failure() {
        let telegram_api = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {
                    "message_id": 7,
                    "date": 0,
                    "chat": { "id": 42, "type": "private" },
                    "text": "hello"
                }
            })))
            .expect(1)
            .mount(&telegram_api)
            .await;

        let telegram = TelegramSender::new(&TelegramConfig {
            bot_token: Some("123:test".into()),
            chat_id: Some("42".into()),
            api_url: Some(telegram_api.uri()),
        })
        .unwrap();
        let relay = Relay::new(None, WebhookSender::new(None, DEFAULT_USERNAME), telegram);

        let mut req = request("hello");
        req.send_telegram = true;
        let outcome = relay.deliver(&req).await;

        assert!(outcome.success);
        assert!(!outcome.results.discord.as_ref().unwrap().success);
        assert!(outcome.results.telegram.as_ref().unwrap().success);
    }

    #[test]
    fn test_timestamp_has_millis_and_z() {
        let outcome = AggregateResult {
            success: true,
            results: ChannelResults {
                discord: None,
                telegram: None,
            },
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123456Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T10:20:30.123Z");
        assert_eq!(value["results"], json!({"discord": null, "telegram": null}));
    }
}
