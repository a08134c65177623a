mod api;
mod cli;
mod remind_runner;
mod router;
mod startup;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rentwatch_core::Config;

use crate::cli::{Cli, Command};
use crate::startup::Backends;
use crate::state::AppState;

fn load_config() -> anyhow::Result<Config> {
    rentwatch_core::config::load_dotenv();
    let config = Config::from_env().context("loading configuration")?;
    config.log_summary();
    Ok(config)
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let remind_loop = match &state.config.schedule.remind_cron {
        Some(expr) => {
            let schedule = remind_runner::parse_schedule(expr)?;
            Some(remind_runner::spawn_remind_loop(state.clone(), schedule))
        }
        None => None,
    };

    let addr = state.config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on http://{addr}");

    let shutdown = state.shutdown.clone();
    let app = router::build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    if let Some(handle) = remind_loop {
        handle.await.ok();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config()?);
    let backends = Backends {
        memory: cli.memory,
        dry_run: cli.dry_run,
    };
    let ctx = startup::build_context(&config, backends).await?;
    let state = Arc::new(AppState::new(config, ctx, CancellationToken::new()));

    match cli.command {
        Command::Serve => serve(state).await?,
        Command::Check { path } => {
            let outcome = state.check.run(&path).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.notice_failed() {
                anyhow::bail!("charge posted for {} but the notice was not delivered", outcome.payer_id);
            }
        }
        Command::Remind => {
            let cancel = state.shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let report = state.scanner.sweep(&state.shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
