use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// Liveness probe. Fixed body, no side effects.
pub async fn health_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "service": "pr-diary" })),
    )
}
