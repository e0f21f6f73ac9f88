use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::analytics::Analytics;
use crate::error::Result;

const DEFAULT_RUN_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct DashboardState {
    analytics_db: Arc<PathBuf>,
}

impl DashboardState {
    pub fn new(analytics_db: PathBuf) -> Self {
        Self {
            analytics_db: Arc::new(analytics_db),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    limit: Option<u32>,
}

pub fn create_router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/runs", get(list_runs))
        .route("/stats", get(get_stats))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")})),
    )
}

/// Runs a read against the analytics store off the async threads.
async fn with_analytics<T, F>(state: &DashboardState, read: F) -> std::result::Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&Analytics) -> Result<T> + Send + 'static,
{
    let path = state.analytics_db.clone();
    tokio::task::spawn_blocking(move || Analytics::open(&path).and_then(|db| read(&db)))
        .await
        .map_err(|e| {
            error!("Analytics task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Analytics read failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn list_runs(State(state): State<DashboardState>, Query(query): Query<RunsQuery>) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT).min(500);
    match with_analytics(&state, move |db| db.recent(limit)).await {
        Ok(runs) => (StatusCode::OK, Json(json!({ "runs": runs }))),
        Err(status) => (status, Json(json!({"error": "analytics unavailable"}))),
    }
}

async fn get_stats(State(state): State<DashboardState>) -> impl IntoResponse {
    match with_analytics(&state, |db| Ok((db.stats()?, db.today_count()?))).await {
        Ok((stats, today)) => (StatusCode::OK, Json(json!({ "stats": stats, "today": today }))),
        Err(status) => (status, Json(json!({"error": "analytics unavailable"}))),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

/// Serves the dashboard on all interfaces until CTRL+C.
pub async fn serve(state: DashboardState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard listening on {}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Dashboard shutdown complete");
    Ok(())
}
