//! Liveness and readiness checks, mounted outside rate limiting and auth.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub database: bool,
    pub cache: bool,
}

/// Liveness. Touches no store.
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness: 503 unless both `PostgreSQL` and Redis answer.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = sqlx::query("SELECT 1").execute(state.pool()).await.is_ok();
    let cache = state.cache().ping().await.is_ok();

    let ready = database && cache;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(Readiness {
            status: if ready { "ready" } else { "unavailable" },
            database,
            cache,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_body() {
        let Json(body) = health().await;
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
