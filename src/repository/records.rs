//! Diesel record structs mapping table rows to and from domain models.

use diesel::prelude::*;

use crate::models::{ErrorKind, FailureRecord, FluidType, OilSpecification, Vehicle};
use crate::schema;

use super::{parse_datetime, parse_datetime_opt};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::vehicles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VehicleRecord {
    pub id: i32,
    pub brand: String,
    pub model: String,
    pub description: String,
    pub engine: String,
    pub period: String,
}

impl From<VehicleRecord> for Vehicle {
    fn from(r: VehicleRecord) -> Self {
        Vehicle {
            id: r.id,
            brand: r.brand,
            model: r.model,
            description: r.description,
            engine: r.engine,
            period: r.period,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::vehicles)]
pub struct NewVehicleRecord<'a> {
    pub id: i32,
    pub brand: &'a str,
    pub model: &'a str,
    pub description: &'a str,
    pub engine: &'a str,
    pub period: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::oil_specifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OilSpecRecord {
    pub id: i32,
    pub vehicle_id: i32,
    pub fluid_type: String,
    pub viscosity: Option<String>,
    pub capacity: Option<String>,
    pub norm: Option<String>,
    pub recommendation: Option<String>,
    pub observation: Option<String>,
    pub source: String,
    pub external_type_id: Option<String>,
    pub confidence: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OilSpecRecord> for OilSpecification {
    fn from(r: OilSpecRecord) -> Self {
        OilSpecification {
            id: r.id,
            vehicle_id: r.vehicle_id,
            fluid_type: FluidType::from_str(&r.fluid_type).unwrap_or(FluidType::Engine),
            viscosity: r.viscosity,
            capacity: r.capacity,
            norm: r.norm,
            recommendation: r.recommendation,
            observation: r.observation,
            source: r.source,
            external_type_id: r.external_type_id,
            confidence: r.confidence,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::oil_specifications)]
pub struct NewOilSpecRecord<'a> {
    pub vehicle_id: i32,
    pub fluid_type: &'a str,
    pub viscosity: Option<&'a str>,
    pub capacity: Option<&'a str>,
    pub norm: Option<&'a str>,
    pub recommendation: Option<&'a str>,
    pub observation: Option<&'a str>,
    pub source: &'a str,
    pub external_type_id: Option<&'a str>,
    pub confidence: Option<f64>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::scraper_failures)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FailureRecordRow {
    pub id: i32,
    pub vehicle_id: i32,
    pub error_kind: String,
    pub message: String,
    pub attempts: i32,
    pub last_attempt: String,
    pub next_attempt: Option<String>,
    pub resolved: i32,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

impl From<FailureRecordRow> for FailureRecord {
    fn from(r: FailureRecordRow) -> Self {
        FailureRecord {
            id: r.id,
            vehicle_id: r.vehicle_id,
            error_kind: ErrorKind::from_str(&r.error_kind),
            message: r.message,
            attempts: r.attempts,
            last_attempt: parse_datetime(&r.last_attempt),
            next_attempt: parse_datetime_opt(r.next_attempt),
            resolved: r.resolved != 0,
            resolved_at: parse_datetime_opt(r.resolved_at),
            created_at: parse_datetime(&r.created_at),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::scraper_failures)]
pub struct NewFailureRecord<'a> {
    pub vehicle_id: i32,
    pub error_kind: &'a str,
    pub message: &'a str,
    pub attempts: i32,
    pub last_attempt: &'a str,
    pub next_attempt: Option<&'a str>,
    pub resolved: i32,
    pub resolved_at: Option<&'a str>,
    pub created_at: &'a str,
}
