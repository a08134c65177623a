use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, warn};

use rentwatch_engine::{CheckError, CheckOutcome};

use super::{detached, error_body, ApiError};
use crate::state::AppState;

/// POST /notice
///
/// Body is the identity record key as plain text. Runs one accrual check.
/// Returns 502 when the charge was posted but the notice could not be sent;
/// the body still carries the outcome.
pub async fn notice(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, Json<CheckOutcome>), ApiError> {
    let key = body.trim().to_string();
    if key.is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "request body must name an identity record"));
    }

    let check = {
        let (state, key) = (state.clone(), key.clone());
        async move { state.check.run(&key).await }
    };
    let outcome = detached(check).await?.map_err(|e| {
        let status = match &e {
            CheckError::Input(_) => StatusCode::BAD_REQUEST,
            CheckError::Storage(_) | CheckError::IdentityWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(key = %key, error = %e, "Accrual check failed");
        } else {
            warn!(key = %key, error = %e, "Accrual check rejected");
        }
        error_body(status, e)
    })?;

    let status = if outcome.notice_failed() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}
