use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::platform::discord::{BotSession, Embed};

/// In-memory bot session that records what it was asked to send
#[derive(Default)]
pub struct MockSession {
    pub ready: bool,
    pub text_channel: bool,
    pub resolve_error: Option<String>,
    pub fail_send: bool,
    pub sends: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
    pub embeds: Mutex<Vec<Embed>>,
}

impl MockSession {
    /// Ready session pointing at a text channel
    pub fn ready() -> Self {
        Self {
            ready: true,
            text_channel: true,
            ..Default::default()
        }
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn embeds(&self) -> Vec<Embed> {
        self.embeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotSession for MockSession {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn is_text_channel(&self, _channel_id: &str) -> Result<bool> {
        if let Some(err) = &self.resolve_error {
            bail!("{err}");
        }
        Ok(self.text_channel)
    }

    async fn send_text(&self, _channel_id: &str, content: &str) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            bail!("Missing Permissions");
        }
        self.texts.lock().unwrap().push(content.to_string());
        Ok(())
    }

    async fn send_embed(&self, _channel_id: &str, embed: &Embed) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            bail!("Missing Permissions");
        }
        self.embeds.lock().unwrap().push(embed.clone());
        Ok(())
    }
}
