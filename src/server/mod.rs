//! Read-only catalog API over the local database.
//!
//! Thin SQL-over-HTTP handlers: vehicles, their oil specifications and
//! failure statistics. No authentication, no writes.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::repository::{
    AsyncSqlitePool, FailureRepository, OilSpecRepository, VehicleRepository,
};

/// Shared state for the catalog API.
#[derive(Clone)]
pub struct AppState {
    pub vehicles: Arc<VehicleRepository>,
    pub specs: Arc<OilSpecRepository>,
    pub failures: Arc<FailureRepository>,
}

impl AppState {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self {
            vehicles: Arc::new(VehicleRepository::new(pool.clone())),
            specs: Arc::new(OilSpecRepository::new(pool.clone())),
            failures: Arc::new(FailureRepository::new(pool)),
        }
    }
}

/// Serve the catalog API until cancellation.
pub async fn serve(
    pool: AsyncSqlitePool,
    host: &str,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let state = AppState::new(pool);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!(%addr, "starting catalog API");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = async move { cancel.cancelled().await };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FluidType, NewOilSpecification, Vehicle};
    use crate::repository::init_schema;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();

        let state = AppState::new(pool);
        state
            .vehicles
            .insert(&Vehicle {
                id: 1,
                brand: "Volkswagen".into(),
                model: "Gol".into(),
                description: "Gol - 1.0 12V".into(),
                engine: "1.0 12V".into(),
                period: "2019 -->".into(),
            })
            .await
            .unwrap();
        state
            .specs
            .insert(&NewOilSpecification {
                vehicle_id: 1,
                fluid_type: FluidType::Engine,
                viscosity: Some("5W-30".into()),
                capacity: Some("3.5 L".into()),
                norm: None,
                recommendation: Some("8100 ECO-NERGY 5W-30".into()),
                observation: None,
                source: "motul".into(),
                external_type_id: Some("157067".into()),
                confidence: Some(0.95),
            })
            .await
            .unwrap();

        (create_router(state), dir)
    }

    async fn get(router: &axum::Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_vehicle_detail_and_specs() {
        let (app, _dir) = setup_test_app().await;

        let (status, body) = get(&app, "/api/vehicles/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["brand"], "Volkswagen");

        let (status, body) = get(&app, "/api/vehicles/1/specifications").await;
        assert_eq!(status, StatusCode::OK);
        let specs = body.as_array().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0]["fluid_type"], "engine");
        assert_eq!(specs[0]["fluid_label"], "Óleo do Motor");
        assert_eq!(specs[0]["viscosity"], "5W-30");
    }

    #[tokio::test]
    async fn test_vehicle_not_found() {
        let (app, _dir) = setup_test_app().await;
        let (status, _) = get(&app, "/api/vehicles/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_vehicle_listing_filters_by_brand() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get(&app, "/api/vehicles?brand=Volks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vehicles"].as_array().unwrap().len(), 1);

        let (_, body) = get(&app, "/api/vehicles?brand=Renault").await;
        assert_eq!(body["vehicles"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failure_stats_empty() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get(&app, "/api/failures/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending"], 0);
    }
}
