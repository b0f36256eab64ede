use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::registry::Registry;

/// GET /health
pub async fn health_check(Extension(registry): Extension<Registry>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "matches": registry.len().await,
    }))
}
