use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::dispatch::{BackendStatus, StatusSource};

#[derive(Clone)]
pub struct DashboardState {
    pub source: Arc<dyn StatusSource>,
}

#[derive(Serialize)]
struct BackendsResponse {
    backends: Vec<BackendStatus>,
    total_outstanding_cost: u64,
    total_in_flight: usize,
}

/// Read-only routes over the pool and request counters.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/backends", get(backends_handler))
        .route("/api/stats", get(stats_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn backends_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let backends = state.source.backends();
    let total_outstanding_cost = backends
        .iter()
        .fold(0u64, |acc, b| acc.saturating_add(b.outstanding_cost));
    let total_in_flight = backends.iter().map(|b| b.in_flight).sum();

    Json(BackendsResponse {
        backends,
        total_outstanding_cost,
        total_in_flight,
    })
}

async fn stats_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.source.stats())
}
