//! Persistence for normalized oil specifications.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::{NewOilSpecification, OilSpecification};
use crate::schema::oil_specifications;

use super::records::{NewOilSpecRecord, OilSpecRecord};
use super::{AsyncSqlitePool, StoreError};

#[derive(Clone)]
pub struct OilSpecRepository {
    pool: AsyncSqlitePool,
}

impl OilSpecRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Append one specification row. Duplicate suppression happens upstream
    /// via the exists-check in the scrape pipeline.
    pub async fn insert(&self, spec: &NewOilSpecification) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        diesel::insert_into(oil_specifications::table)
            .values(NewOilSpecRecord {
                vehicle_id: spec.vehicle_id,
                fluid_type: spec.fluid_type.as_str(),
                viscosity: spec.viscosity.as_deref(),
                capacity: spec.capacity.as_deref(),
                norm: spec.norm.as_deref(),
                recommendation: spec.recommendation.as_deref(),
                observation: spec.observation.as_deref(),
                source: &spec.source,
                external_type_id: spec.external_type_id.as_deref(),
                confidence: spec.confidence,
                created_at: &now,
                updated_at: &now,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Whether any specification exists for the vehicle.
    pub async fn exists_for_vehicle(&self, vehicle_id: i32) -> Result<bool, StoreError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;
        let count: i64 = oil_specifications::table
            .filter(oil_specifications::vehicle_id.eq(vehicle_id))
            .select(count_star())
            .first(&mut conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn for_vehicle(&self, vehicle_id: i32) -> Result<Vec<OilSpecification>, StoreError> {
        let mut conn = self.pool.get().await?;
        let records = oil_specifications::table
            .filter(oil_specifications::vehicle_id.eq(vehicle_id))
            .order(oil_specifications::id.asc())
            .load::<OilSpecRecord>(&mut conn)
            .await?;
        Ok(records.into_iter().map(OilSpecification::from).collect())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;
        Ok(oil_specifications::table
            .select(count_star())
            .first(&mut conn)
            .await?)
    }
}
