// src/routes/health.rs
//! Liveness endpoint for the reports service.
//!
//! `/health` is polled by container orchestrators and by the integration
//! tests to confirm the HTTP listener is up. It touches neither the store
//! nor the telemetry platform, so it stays green while the platform is down.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route.
///
/// Generic over the application state so the gateway can merge it into a
/// router carrying [`AppState`](super::AppState).
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_health_body() {
        // ---
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }
}
