//! Healthcheck endpoint handler.

use axum::Json;
use serde_json::{json, Value};

/// Liveness answer for orchestrators and load balancers.
///
/// Always returns 200 with `{"status": "ok"}`; it checks that the process
/// is serving, nothing downstream.
pub async fn healthcheck_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
