//! Notifier trait definition and shared error types.

/// Errors from a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("messaging API rejected the message ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Every attempt for one message failed.
#[derive(Debug, thiserror::Error)]
#[error("delivery to channel {channel} failed after {attempts} attempt(s): {last_error}")]
pub struct DeliveryError {
    pub channel: String,
    pub attempts: u32,
    #[source]
    pub last_error: NotifyError,
}

/// Trait for messaging service implementations.
///
/// One call is one delivery attempt; retrying is the dispatcher's job.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Post `text` to the given channel.
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError>;

    /// Human-readable name for this service (e.g., "discord").
    fn channel_name(&self) -> &str;
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Notifier that only logs. Used for dry runs and when no bot token is set.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: &str, text: &str) -> Result<(), NotifyError> {
        tracing::info!(channel, text, "Notice (dry run)");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
