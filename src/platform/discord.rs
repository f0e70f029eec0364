use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::all::{
    Channel, ChannelId, Client, Context, CreateEmbed, CreateMessage, EventHandler,
    GatewayIntents, Http, Ready, Timestamp,
};
use tracing::{error, info, warn};

use crate::format::{format_code_blocks, Platform};
use crate::platform::{ChannelSender, DeliveryMethod, DeliveryResult, SendOptions};

/// Name used for webhook posts and embed titles when the caller gives none
pub const DEFAULT_USERNAME: &str = "Logger Bot";

/// Accent colour of embed cards
pub const EMBED_COLOR: u32 = 0x5865F2;

/// Discord's cap on embed descriptions, in characters
pub const EMBED_DESCRIPTION_LIMIT: usize = 4096;

const TRUNCATION_MARKER: &str = "...";

/// Rich card sent through the bot channel
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: &str) -> Self {
        Self {
            title: title.into(),
            description: truncate_description(description, EMBED_DESCRIPTION_LIMIT),
            color: EMBED_COLOR,
            timestamp: Utc::now(),
        }
    }
}

/// Cut `text` to at most `limit` characters, ending with `...` when shortened
pub fn truncate_description(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// A long-lived bot connection. Owned outside the request path; requests
/// only poll readiness and send through it.
#[async_trait]
pub trait BotSession: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Resolve the channel and report whether it accepts text messages
    async fn is_text_channel(&self, channel_id: &str) -> Result<bool>;

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<()>;

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()>;
}

// ── Serenity-backed session ────────────────────────────────────────────────────

struct ReadyHandler {
    ready: Arc<AtomicBool>,
}

#[serenity::async_trait]
impl EventHandler for ReadyHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot logged in as {}", ready.user.name);
        self.ready.store(true, Ordering::SeqCst);
    }
}

/// Discord gateway session. Logs in on a background task; `is_ready` flips
/// once the gateway reports ready.
pub struct DiscordSession {
    http: Arc<Http>,
    ready: Arc<AtomicBool>,
}

impl DiscordSession {
    pub async fn connect(token: &str) -> Result<Self> {
        let ready = Arc::new(AtomicBool::new(false));
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;

        let mut client = Client::builder(token, intents)
            .event_handler(ReadyHandler {
                ready: Arc::clone(&ready),
            })
            .await
            .context("Failed to create Discord client")?;

        let http = Arc::clone(&client.http);
        let task_ready = Arc::clone(&ready);
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!("Discord bot login failed: {}", e);
            }
            task_ready.store(false, Ordering::SeqCst);
        });

        Ok(Self { http, ready })
    }
}

fn parse_channel_id(raw: &str) -> Result<ChannelId> {
    let id: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid channel id: {raw}"))?;
    anyhow::ensure!(id != 0, "Invalid channel id: {raw}");
    Ok(ChannelId::new(id))
}

#[async_trait]
impl BotSession for DiscordSession {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn is_text_channel(&self, channel_id: &str) -> Result<bool> {
        let channel = parse_channel_id(channel_id)?
            .to_channel(&self.http)
            .await
            .context("Failed to fetch Discord channel")?;

        Ok(match channel {
            Channel::Guild(guild_channel) => guild_channel.is_text_based(),
            Channel::Private(_) => true,
            _ => false,
        })
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<()> {
        parse_channel_id(channel_id)?
            .send_message(&self.http, CreateMessage::new().content(content))
            .await
            .context("Failed to send Discord message")?;
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        let card = CreateEmbed::new()
            .title(&embed.title)
            .description(&embed.description)
            .colour(embed.color)
            .timestamp(Timestamp::from(embed.timestamp));

        parse_channel_id(channel_id)?
            .send_message(&self.http, CreateMessage::new().embed(card))
            .await
            .context("Failed to send Discord embed")?;
        Ok(())
    }
}

// ── Senders ────────────────────────────────────────────────────────────────────

/// Sends through the bot session to one configured channel
pub struct BotSender {
    session: Arc<dyn BotSession>,
    channel_id: String,
    default_username: String,
}

impl BotSender {
    pub fn new(
        session: Arc<dyn BotSession>,
        channel_id: impl Into<String>,
        default_username: impl Into<String>,
    ) -> Self {
        Self {
            session,
            channel_id: channel_id.into(),
            default_username: default_username.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }
}

#[async_trait]
impl ChannelSender for BotSender {
    fn name(&self) -> &'static str {
        "bot"
    }

    async fn send(&self, message: &str, options: &SendOptions) -> DeliveryResult {
        if !self.session.is_ready() {
            return DeliveryResult::failed("Bot not ready");
        }

        match self.session.is_text_channel(&self.channel_id).await {
            Ok(true) => {}
            Ok(false) => return DeliveryResult::failed("Invalid channel"),
            Err(e) => {
                error!("Discord bot error: {:#}", e);
                return DeliveryResult::failed(format!("{:#}", e));
            }
        }

        let content = format_code_blocks(message, Platform::Discord.as_str());

        let (outcome, method) = if options.embed {
            let title = options
                .username
                .as_deref()
                .unwrap_or(&self.default_username);
            let embed = Embed::new(title, &content);
            (
                self.session.send_embed(&self.channel_id, &embed).await,
                DeliveryMethod::Embed,
            )
        } else {
            (
                self.session.send_text(&self.channel_id, &content).await,
                DeliveryMethod::Bot,
            )
        };

        match outcome {
            Ok(()) => {
                info!("Message sent via Discord bot");
                DeliveryResult::sent(method)
            }
            Err(e) => {
                error!("Discord bot error: {:#}", e);
                DeliveryResult::failed(format!("{:#}", e))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
}

/// Posts to a Discord webhook URL. Plain text only.
pub struct WebhookSender {
    client: reqwest::Client,
    url: Option<String>,
    default_username: String,
}

impl WebhookSender {
    pub fn new(url: Option<String>, default_username: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            default_username: default_username.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, message: &str, options: &SendOptions) -> DeliveryResult {
        let Some(url) = self.url.as_deref() else {
            return DeliveryResult::failed("Webhook not configured");
        };

        let content = format_code_blocks(message, Platform::Discord.as_str());
        let payload = WebhookPayload {
            content: &content,
            username: options
                .username
                .as_deref()
                .unwrap_or(&self.default_username),
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::OK || status == reqwest::StatusCode::NO_CONTENT {
                    info!("Message sent via Discord webhook");
                    DeliveryResult::sent(DeliveryMethod::Webhook)
                } else {
                    warn!("Discord webhook returned {}", status);
                    DeliveryResult::failed(format!("Status: {}", status.as_u16()))
                }
            }
            Err(e) => {
                error!("Discord webhook error: {}", e);
                DeliveryResult::failed(e.to_string())
            }
        }
    }
}
