//! HTTP handlers.
//!
//! Handlers return `(StatusCode, Json<Value>)` on error with an
//! `{"error": ...}` body.

mod balances;
mod health;
mod notice;
mod remind;

use std::future::Future;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use rentwatch_store::StoreError;

pub use balances::{balance_get, balances_list};
pub use health::health;
pub use notice::notice;
pub use remind::remind;

pub type ApiError = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

/// Run engine work on its own task. Hyper drops the handler future when the
/// client disconnects; the spawned task keeps going, so a charge is never
/// left half-recorded and in-flight notices finish.
async fn detached<F>(work: F) -> Result<F::Output, ApiError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(work).await.map_err(|e| {
        error!(error = %e, "Engine task did not complete");
        error_body(StatusCode::INTERNAL_SERVER_ERROR, "engine task did not complete")
    })
}

/// Map a ledger error to an HTTP response.
fn store_err(e: StoreError) -> ApiError {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_body(status, e)
}
