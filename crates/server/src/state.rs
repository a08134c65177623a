use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use rentwatch_core::Config;
use rentwatch_engine::{AccrualCheck, EngineContext, ReminderScanner};
use rentwatch_store::LedgerStore;

pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<dyn LedgerStore>,
    pub check: AccrualCheck,
    pub scanner: ReminderScanner,
    /// Fired on shutdown; sweeps stop starting new sends.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>, ctx: EngineContext, shutdown: CancellationToken) -> Self {
        let concurrency = config.dispatch.sweep_concurrency;
        Self {
            ledger: ctx.ledger.clone(),
            check: AccrualCheck::new(ctx.clone()),
            scanner: ReminderScanner::new(ctx, concurrency),
            config,
            shutdown,
        }
    }
}
