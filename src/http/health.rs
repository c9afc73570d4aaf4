//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::server::AppState;

/// Report availability, environment and version.
pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.env.to_string(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
