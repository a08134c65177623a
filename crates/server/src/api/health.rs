use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use rentwatch_store::with_deadline;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ledger: String,
    pub ledger_error: Option<String>,
    pub sweeping: bool,
}

/// GET /health. 503 when the ledger does not answer.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let ping = with_deadline(state.config.postgres.storage_timeout(), state.ledger.ping()).await;
    let (status, code, ledger_error) = match ping {
        Ok(()) => ("ok", StatusCode::OK, None),
        Err(e) => ("degraded", StatusCode::SERVICE_UNAVAILABLE, Some(e.to_string())),
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            ledger: state.ledger.backend_name().to_string(),
            ledger_error,
            sweeping: state.scanner.is_scanning(),
        }),
    )
}
