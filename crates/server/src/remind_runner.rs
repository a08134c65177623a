//! In-process reminder schedule.
//!
//! When `REMIND_CRON` is set, a background task runs a reminder sweep at
//! each scheduled tick until shutdown. Without it, sweeps only happen when
//! `POST /remind` is called.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rentwatch_engine::SweepError;

use crate::state::AppState;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

pub fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(&normalize_cron(expr))
        .map_err(|e| anyhow::anyhow!("invalid REMIND_CRON '{expr}': {e}"))
}

/// Time until the next tick, or `None` if the schedule has no future ticks.
fn until_next(schedule: &Schedule) -> Option<Duration> {
    let next = schedule.upcoming(Utc).next()?;
    Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

pub fn spawn_remind_loop(state: Arc<AppState>, schedule: Schedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Reminder schedule started");
        loop {
            let Some(wait) = until_next(&schedule) else {
                warn!("Reminder schedule has no future ticks; stopping");
                break;
            };
            debug!(wait_secs = wait.as_secs(), "Waiting for next reminder tick");

            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match state.scanner.sweep(&state.shutdown).await {
                Ok(report) => debug!(notified = report.notified, "Scheduled sweep done"),
                Err(SweepError::AlreadyRunning) => {
                    info!("Skipping scheduled sweep; one is already running")
                }
                Err(e) => warn!(error = %e, "Scheduled sweep failed"),
            }
        }
        info!("Reminder schedule stopped");
    })
}
