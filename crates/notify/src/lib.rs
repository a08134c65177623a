//! Notice delivery for rent tracking.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable messaging services
//! - Discord bot notifier and a log-only notifier for dry runs
//! - Minijinja rendering of the notice and reminder messages
//! - Dispatcher that renders a message and delivers it with retries

pub mod discord;
pub mod dispatcher;
pub mod templating;
pub mod traits;

pub use discord::DiscordNotifier;
pub use dispatcher::{DispatchError, Dispatcher, RetryPolicy};
pub use templating::{NoticeParams, TemplateError, TemplateKind, TemplateRenderer};
pub use traits::{DeliveryError, DeliveryReceipt, LogNotifier, Notifier, NotifyError};
