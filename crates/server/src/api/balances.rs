//! Read-only views over aggregated balances.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use rentwatch_core::{format_minor_units, AggregatedBalance, LedgerEntry};
use rentwatch_store::with_deadline;

use super::{store_err, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceView {
    #[serde(flatten)]
    pub balance: AggregatedBalance,
    /// Balance in major units, e.g. `-2.60`.
    pub display_balance: String,
}

impl From<AggregatedBalance> for BalanceView {
    fn from(balance: AggregatedBalance) -> Self {
        Self {
            display_balance: format_minor_units(balance.balance),
            balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceDetail {
    #[serde(flatten)]
    pub view: BalanceView,
    pub entries: Vec<LedgerEntry>,
}

/// GET /balances
pub async fn balances_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BalanceView>>, ApiError> {
    let deadline = state.config.postgres.storage_timeout();
    let all = with_deadline(deadline, state.ledger.aggregate_all())
        .await
        .map_err(store_err)?;
    Ok(Json(all.into_iter().map(BalanceView::from).collect()))
}

/// GET /balances/{payer_id}
pub async fn balance_get(
    State(state): State<Arc<AppState>>,
    Path(payer_id): Path<String>,
) -> Result<Json<BalanceDetail>, ApiError> {
    let deadline = state.config.postgres.storage_timeout();
    let balance = with_deadline(deadline, state.ledger.aggregate_for(&payer_id))
        .await
        .map_err(store_err)?;
    let entries = with_deadline(deadline, state.ledger.entries_for(&payer_id))
        .await
        .map_err(store_err)?;
    Ok(Json(BalanceDetail {
        view: balance.into(),
        entries,
    }))
}
