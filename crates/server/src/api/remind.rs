use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use rentwatch_engine::{SweepError, SweepReport};

use super::{detached, error_body, ApiError};
use crate::state::AppState;

/// POST /remind
///
/// Runs one reminder sweep. Per-payer failures are listed in the report and
/// do not change the status code.
pub async fn remind(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>, ApiError> {
    let cancel = state.shutdown.child_token();
    let sweep = async move { state.scanner.sweep(&cancel).await };
    detached(sweep).await?.map(Json).map_err(|e| {
        let status = match e {
            SweepError::AlreadyRunning => StatusCode::CONFLICT,
            SweepError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_body(status, e)
    })
}
