//! Request handlers for the catalog API.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::OilSpecification;

use super::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
pub struct ListVehiclesQuery {
    pub brand: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<ListVehiclesQuery>,
) -> Result<Json<Value>, StatusCode> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let vehicles = state
        .vehicles
        .list(query.brand.as_deref(), limit, offset)
        .await
        .map_err(internal_error)?;

    Ok(Json(json!({
        "vehicles": vehicles,
        "limit": limit,
        "offset": offset,
    })))
}

pub async fn vehicle_detail(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, StatusCode> {
    let vehicle = state
        .vehicles
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::to_value(vehicle).unwrap_or_default()))
}

pub async fn vehicle_specifications(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, StatusCode> {
    state
        .vehicles
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let specs = state.specs.for_vehicle(id).await.map_err(internal_error)?;
    let payload: Vec<Value> = specs.iter().map(spec_payload).collect();
    Ok(Json(Value::Array(payload)))
}

/// Specification payload with the localized fluid label alongside the
/// canonical code.
fn spec_payload(spec: &OilSpecification) -> Value {
    json!({
        "id": spec.id,
        "vehicle_id": spec.vehicle_id,
        "fluid_type": spec.fluid_type.as_str(),
        "fluid_label": spec.fluid_type.localized_label(),
        "viscosity": spec.viscosity,
        "capacity": spec.capacity,
        "norm": spec.norm,
        "recommendation": spec.recommendation,
        "observation": spec.observation,
        "source": spec.source,
        "external_type_id": spec.external_type_id,
        "confidence": spec.confidence,
        "created_at": spec.created_at.to_rfc3339(),
    })
}

pub async fn failure_stats(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let pending = state.failures.count_pending().await.map_err(internal_error)?;
    let stats = state.failures.stats().await.map_err(internal_error)?;

    let by_kind: HashMap<&'static str, i64> = stats
        .into_iter()
        .map(|(kind, count)| (kind.as_str(), count))
        .collect();

    Ok(Json(json!({
        "pending": pending,
        "by_kind": by_kind,
    })))
}

fn internal_error(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!(error = %e, "catalog API database error");
    StatusCode::INTERNAL_SERVER_ERROR
}
