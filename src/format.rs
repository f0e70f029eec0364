use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `[code]...[/code]`, shortest match, content may span lines
static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[code\](.*?)\[/code\]").expect("code block pattern"));

/// Rich-text dialect of a destination platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Discord,
    Telegram,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Telegram => "telegram",
        }
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discord" => Ok(Platform::Discord),
            "telegram" => Ok(Platform::Telegram),
            _ => Err(()),
        }
    }
}

/// Rewrite `[code]` blocks for a platform named by string.
/// Unknown platforms get the text back untouched.
pub fn format_code_blocks(text: &str, platform: &str) -> String {
    match platform.parse::<Platform>() {
        Ok(platform) => format_for(text, platform),
        Err(()) => text.to_string(),
    }
}

/// Rewrite every `[code]...[/code]` pair into the platform's code block syntax.
/// Text outside the markers is left byte-for-byte as is.
fn format_for(text: &str, platform: Platform) -> String {
    CODE_BLOCK
        .replace_all(text, |caps: &Captures| {
            let content = caps[1].trim();
            match platform {
                Platform::Discord => format!("```\n{content}\n```"),
                Platform::Telegram => format!("<pre>{}</pre>", escape_angle_brackets(content)),
            }
        })
        .into_owned()
}

fn escape_angle_brackets(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}
