//! Read-only HTTP monitor for a running crawl.
//!
//! Exposes the progress snapshot and key-pool health. Monitor failures
//! never affect the crawl itself.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clients::{DisambiguatorClient, KeyPoolHealth};

use super::progress::ProgressTracker;

/// Source of key-pool health for the status payload.
pub trait KeyPoolStatusSource: Send + Sync {
    fn key_pool_health(&self) -> KeyPoolHealth;
}

impl KeyPoolStatusSource for DisambiguatorClient {
    fn key_pool_health(&self) -> KeyPoolHealth {
        DisambiguatorClient::key_pool_health(self)
    }
}

#[derive(Clone)]
pub struct MonitorState {
    pub progress: Arc<ProgressTracker>,
    pub key_pool: Option<Arc<dyn KeyPoolStatusSource>>,
}

pub fn monitor_router(state: MonitorState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .with_state(state)
}

async fn handle_status(State(state): State<MonitorState>) -> Json<serde_json::Value> {
    let snapshot = state.progress.snapshot();

    let mut body = json!({
        "status": "running",
        "started_at": snapshot.started_at.to_rfc3339(),
        "elapsed_secs": snapshot.elapsed_secs,
        "progress": {
            "total_vehicles": snapshot.total,
            "processed": snapshot.processed,
            "success": snapshot.success,
            "failed": snapshot.failed,
            "skipped": snapshot.skipped,
            "percentage": format!("{:.2}", snapshot.percentage),
        },
        "matching_stats": {
            "exact_match": snapshot.exact_match,
            "fuzzy_match": snapshot.fuzzy_match,
            "no_match": snapshot.no_match,
        },
        "rate": {
            "current_rps": format!("{:.2}", snapshot.requests_per_sec),
            "avg_secs_per_vehicle": format!("{:.2}", snapshot.avg_secs_per_vehicle),
            "network_errors": snapshot.network_errors,
            "rate_limit_hits": snapshot.rate_limit_hits,
        },
        "eta": {
            "remaining_vehicles": snapshot.remaining,
            "estimated_completion": snapshot
                .estimated_completion
                .map(|t| t.to_rfc3339()),
            "remaining_secs": snapshot.remaining_secs,
        },
        "current_vehicle": snapshot.current_vehicle,
        "last_error": snapshot.last_error,
    });

    if let Some(key_pool) = &state.key_pool {
        body["key_pool"] = serde_json::to_value(key_pool.key_pool_health()).unwrap_or_default();
    }

    Json(body)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Run the monitor until the cancellation token fires. Bind or serve errors
/// are logged and swallowed.
pub async fn serve_monitor(port: u16, state: MonitorState, cancel: CancellationToken) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let app = monitor_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "monitor failed to bind, continuing without it");
            return;
        }
    };

    info!(%addr, "HTTP monitor started");
    let shutdown = async move { cancel.cancelled().await };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        warn!(error = %e, "monitor server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state(progress: Arc<ProgressTracker>) -> MonitorState {
        MonitorState {
            progress,
            key_pool: None,
        }
    }

    async fn get_json(router: Router, path: &str) -> serde_json::Value {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = monitor_router(test_state(Arc::new(ProgressTracker::new(0))));
        let body = get_json(router, "/health").await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reflects_progress() {
        let progress = Arc::new(ProgressTracker::new(4));
        progress.inc_processed();
        progress.inc_processed();
        progress.inc_success();
        progress.set_current_vehicle("#7 Gol - 1.0");

        let router = monitor_router(test_state(progress));
        let body = get_json(router, "/status").await;

        assert_eq!(body["progress"]["total_vehicles"], 4);
        assert_eq!(body["progress"]["processed"], 2);
        assert_eq!(body["progress"]["percentage"], "50.00");
        assert_eq!(body["current_vehicle"], "#7 Gol - 1.0");
        assert!(body.get("key_pool").is_none());
    }
}
