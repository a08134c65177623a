//! Discord bot notifier.
//!
//! Posts plain messages through the REST `channels/{id}/messages` endpoint,
//! authenticated with a bot token.

use crate::traits::{Notifier, NotifyError};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug)]
pub struct DiscordNotifier {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordNotifier {
    /// Creates a notifier from configuration values.
    ///
    /// If `bot_token` starts with `${`, the value between `${` and `}` is
    /// resolved as an environment variable name. Returns
    /// [`NotifyError::Config`] if the token is empty or the env var is missing.
    pub fn from_config(bot_token: String, api_base: Option<String>) -> Result<Self, NotifyError> {
        let resolved_token = resolve_token(bot_token, |name| std::env::var(name).ok())?;
        let api_base = api_base
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            bot_token: resolved_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn message_url(&self, channel: &str) -> String {
        format!("{}/channels/{channel}/messages", self.api_base)
    }
}

fn resolve_token(
    bot_token: String,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, NotifyError> {
    let resolved = if bot_token.starts_with("${") {
        let var_name = bot_token
            .strip_prefix("${")
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| NotifyError::Config(format!("Malformed env var reference: {bot_token}")))?;
        lookup(var_name).ok_or_else(|| {
            NotifyError::Config(format!("Environment variable '{var_name}' is not set"))
        })?
    } else {
        bot_token
    };

    if resolved.trim().is_empty() {
        return Err(NotifyError::Config("Discord bot token must not be empty".to_string()));
    }
    Ok(resolved)
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "content": text,
            "allowed_mentions": { "parse": ["users"] },
        });

        tracing::debug!(channel, "Sending Discord message");

        let response = self
            .client
            .post(self.message_url(channel))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let resp_body: serde_json::Value = response.json().await.unwrap_or_default();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("retry_after")
                .and_then(|v| v.as_f64())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(1);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let message = resp_body
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Discord API error")
            .to_string();

        Err(NotifyError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn channel_name(&self) -> &str {
        "discord"
    }
}
