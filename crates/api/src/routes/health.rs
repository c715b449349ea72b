//! Health probes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::websocket::WebSocketStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: Health,
    pub version: &'static str,
    pub database: Health,
    pub websocket: WebSocketStats,
}

async fn store_health(state: &AppState) -> Health {
    match state.rules.ping().await {
        Ok(()) => Health::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unreachable");
            Health::Unhealthy
        }
    }
}

/// Store reachability plus live socket and room counts
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = store_health(&state).await;
    let code = match database {
        Health::Healthy => StatusCode::OK,
        Health::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = HealthResponse {
        status: database,
        version: env!("CARGO_PKG_VERSION"),
        database,
        websocket: state.ws_state.stats().await,
    };

    (code, Json(body))
}

/// Liveness probe
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: ready once the store answers
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match store_health(&state).await {
        Health::Healthy => StatusCode::OK,
        Health::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}
