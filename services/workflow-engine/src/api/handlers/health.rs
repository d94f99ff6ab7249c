use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use redress_database::mongo_health_check;

use crate::api::AppState;
use crate::metrics;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "redress-workflow-engine",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics_handler() -> String {
    metrics::render()
}

pub async fn detailed_health_check(State(state): State<AppState>) -> Json<Value> {
    let storage = match &state.mongo {
        Some(client) => match mongo_health_check(client).await {
            Ok(()) => json!({"backend": "mongodb", "status": "healthy", "message": "Connected"}),
            Err(e) => json!({"backend": "mongodb", "status": "unhealthy", "message": e.to_string()}),
        },
        None => json!({"backend": "memory", "status": "healthy", "message": "In-process store"}),
    };
    let healthy = storage["status"] == "healthy";

    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "redress-workflow-engine",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "storage": storage,
            "scheduler": {
                "enabled": state.config.scheduler.enabled,
                "interval_seconds": state.config.scheduler.interval_seconds
            },
            "email": { "enabled": state.config.email.enabled }
        }
    }))
}
