use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/public/get-debug-flags — client-visible diagnostics switch.
pub async fn get_debug_flags(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "debugErrors": app.debug_errors }))
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
