//! Wiring from [`Config`] to a ready [`EngineContext`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use rentwatch_core::{Config, SystemClock};
use rentwatch_engine::EngineContext;
use rentwatch_notify::{
    DiscordNotifier, Dispatcher, LogNotifier, Notifier, RetryPolicy, TemplateRenderer,
};
use rentwatch_store::{JsonFileIdentityStore, LedgerStore, MemoryLedgerStore, PgLedgerStore};

/// How the process should talk to the outside world.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backends {
    /// Keep the ledger in memory instead of PostgreSQL.
    pub memory: bool,
    /// Log notices instead of posting them.
    pub dry_run: bool,
}

/// Open the ledger: PostgreSQL with migrations applied, or an in-memory store.
pub async fn open_ledger(config: &Config, backends: Backends) -> anyhow::Result<Arc<dyn LedgerStore>> {
    if backends.memory {
        warn!("Using in-memory ledger; entries are lost on exit");
        return Ok(Arc::new(MemoryLedgerStore::new()));
    }

    let store = PgLedgerStore::connect(&config.postgres)
        .await
        .with_context(|| format!("connecting to {}", config.postgres.redacted_url()))?;
    store.migrate().await.context("applying ledger migrations")?;
    Ok(Arc::new(store))
}

pub fn build_notifier(config: &Config, backends: Backends) -> anyhow::Result<Arc<dyn Notifier>> {
    if backends.dry_run {
        info!("Dry run: notices are logged, not sent");
        return Ok(Arc::new(LogNotifier));
    }
    let token = config
        .discord
        .bot_token
        .clone()
        .context("BOT_TOKEN is required unless --dry-run is given")?;
    let notifier = DiscordNotifier::from_config(token, Some(config.discord.api_base.clone()))?;
    Ok(Arc::new(notifier))
}

pub async fn build_context(config: &Config, backends: Backends) -> anyhow::Result<EngineContext> {
    let ledger = open_ledger(config, backends).await?;
    let notifier = build_notifier(config, backends)?;
    let renderer = TemplateRenderer::new()?;
    let dispatcher = Dispatcher::new(notifier, renderer, RetryPolicy::from(&config.dispatch));

    info!(
        ledger = ledger.backend_name(),
        notifier = dispatcher.service_name(),
        "Engine ready"
    );

    Ok(EngineContext {
        ledger,
        identities: Arc::new(JsonFileIdentityStore::new(config.identity.root.clone())),
        dispatcher: Arc::new(dispatcher),
        clock: Arc::new(SystemClock),
        notice: Arc::new(config.notice.clone()),
        policy: config.notice.policy(),
        storage_timeout: config.postgres.storage_timeout(),
    })
}
