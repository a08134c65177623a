//! Renders a notice and delivers it with bounded retries.
//!
//! Each message gets up to [`RetryPolicy::attempts`] tries with a fixed pause
//! between them. Every retry sends the exact text rendered for the first try.
//! There is no pause after the final failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rentwatch_core::config::DispatchConfig;

use crate::templating::{NoticeParams, TemplateError, TemplateKind, TemplateRenderer};
use crate::traits::{DeliveryError, DeliveryReceipt, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Render(#[from] TemplateError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    renderer: TemplateRenderer,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, renderer: TemplateRenderer, retry: RetryPolicy) -> Self {
        Self {
            notifier,
            renderer,
            retry,
        }
    }

    pub fn service_name(&self) -> &str {
        self.notifier.channel_name()
    }

    /// Render `kind` with `params` and post it to `channel`.
    pub async fn send(
        &self,
        channel: &str,
        kind: TemplateKind,
        params: &NoticeParams,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let text = self.renderer.render(kind, params)?;
        Ok(self.deliver(channel, &text).await?)
    }

    /// Post pre-rendered text to `channel`, retrying per the policy.
    pub async fn deliver(&self, channel: &str, text: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let attempts = self.retry.attempts.max(1);
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.notifier.send(channel, text).await {
                Ok(()) => {
                    let duration_ms = start.elapsed().as_millis() as u64;
                    tracing::info!(
                        channel,
                        service = self.notifier.channel_name(),
                        attempt,
                        duration_ms,
                        "Notice delivered"
                    );
                    return Ok(DeliveryReceipt {
                        channel: channel.to_string(),
                        attempts: attempt,
                        duration_ms,
                    });
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        channel,
                        service = self.notifier.channel_name(),
                        attempt,
                        error = %e,
                        "Notice delivery failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        channel,
                        service = self.notifier.channel_name(),
                        attempt,
                        error = %e,
                        "Notice delivery failed, giving up"
                    );
                    return Err(DeliveryError {
                        channel: channel.to_string(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}
