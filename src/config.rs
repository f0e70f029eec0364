use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::platform::discord::DEFAULT_USERNAME;

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Shared secret for `POST /send`. Unset means no authentication.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_username")]
    pub default_username: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Bot API base URL, for self-hosted Bot API servers
    #[serde(default)]
    pub api_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_id: None,
            webhook_url: None,
            default_username: default_username(),
        }
    }
}

impl DiscordConfig {
    /// Token and channel id, only when both are set
    pub fn bot_credentials(&self) -> Option<(&str, &str)> {
        Some((self.bot_token.as_deref()?, self.channel_id.as_deref()?))
    }

    pub fn webhook_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

impl TelegramConfig {
    /// Token and chat id, only when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.bot_token.as_deref()?, self.chat_id.as_deref()?))
    }
}

/// Treat `KEY=` the same as an unset key
fn non_empty(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

impl Config {
    pub fn auth_enabled(&self) -> bool {
        self.auth.api_key.is_some()
    }

    /// Load the TOML file (if any), then overlay process environment variables.
    ///
    /// An explicitly named file must exist; the default `relay.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Override file values with environment variables, then drop empty strings.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {port}"))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }

        let overrides: [(&str, &mut Option<String>); 7] = [
            ("API_KEY", &mut self.auth.api_key),
            ("DISCORD_BOT_TOKEN", &mut self.discord.bot_token),
            ("DISCORD_CHANNEL_ID", &mut self.discord.channel_id),
            ("DISCORD_WEBHOOK_URL", &mut self.discord.webhook_url),
            ("TELEGRAM_BOT_TOKEN", &mut self.telegram.bot_token),
            ("TELEGRAM_CHAT_ID", &mut self.telegram.chat_id),
            ("TELEGRAM_API_URL", &mut self.telegram.api_url),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
            non_empty(slot);
        }

        Ok(())
    }
}
