use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Service health state
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_refresh_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_refresh_games: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, games: usize) {
        *self.last_refresh_time.write().await = Some(Utc::now());
        *self.last_refresh_games.write().await = games;
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }
}

/// Status label and HTTP code for a run of consecutive failed refreshes
fn status_for(consecutive_errors: usize) -> (StatusCode, &'static str) {
    let status = if consecutive_errors > 5 { "degraded" } else { "ok" };

    let http_status = if consecutive_errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (http_status, status)
}

/// Health check handler
async fn health_handler(State(health): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    let last_refresh = *health.last_refresh_time.read().await;
    let last_games = *health.last_refresh_games.read().await;
    let errors = *health.error_count.read().await;

    let (http_status, status) = status_for(errors);

    (
        http_status,
        Json(json!({
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_refresh": last_refresh.map(|t| t.to_rfc3339()),
            "last_refresh_games": last_games,
            "consecutive_errors": errors
        })),
    )
}

pub fn router(health: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(health)
}
