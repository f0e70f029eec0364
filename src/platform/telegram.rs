use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use teloxide::{ApiError, RequestError};
use tracing::{error, info};

use crate::config::TelegramConfig;
use crate::format::{format_code_blocks, Platform};
use crate::platform::{ChannelSender, DeliveryMethod, DeliveryResult, SendOptions};

struct TelegramTarget {
    bot: Bot,
    chat: Recipient,
}

/// Sends HTML-formatted messages through the Telegram Bot API
pub struct TelegramSender {
    target: Option<TelegramTarget>,
}

/// Numeric ids go out as chat ids, anything else (`@channel`) as a username
fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}

impl TelegramSender {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let Some((token, chat_id)) = config.credentials() else {
            return Ok(Self { target: None });
        };

        let mut bot = Bot::new(token);
        if let Some(api_url) = &config.api_url {
            let url = reqwest::Url::parse(api_url)
                .with_context(|| format!("Invalid Telegram API URL: {api_url}"))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self {
            target: Some(TelegramTarget {
                bot,
                chat: parse_recipient(chat_id),
            }),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: &str, _options: &SendOptions) -> DeliveryResult {
        let Some(target) = &self.target else {
            return DeliveryResult::failed("Not configured");
        };

        let text = format_code_blocks(message, Platform::Telegram.as_str());

        match target
            .bot
            .send_message(target.chat.clone(), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => {
                info!("Message sent to Telegram");
                DeliveryResult::sent(DeliveryMethod::Bot)
            }
            // Bot API answered with ok=false and a description teloxide has no variant for
            Err(RequestError::Api(ApiError::Unknown(description))) => {
                error!("Telegram error: {}", description);
                DeliveryResult::failed(description)
            }
            Err(RequestError::Api(api_error)) => {
                error!("Telegram error: {}", api_error);
                DeliveryResult::failed(api_error.to_string())
            }
            Err(e) => {
                error!("Telegram error: {}", e);
                DeliveryResult::failed(e.to_string())
            }
        }
    }
}
