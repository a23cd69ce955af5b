//! Read access to the local vehicle catalog.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::Vehicle;
use crate::schema::vehicles;

use super::records::{NewVehicleRecord, VehicleRecord};
use super::{AsyncSqlitePool, StoreError};

#[derive(Clone)]
pub struct VehicleRepository {
    pool: AsyncSqlitePool,
}

impl VehicleRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// All vehicles ordered by id. The crawl feeds from this, in order.
    pub async fn get_all(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut conn = self.pool.get().await?;
        let records = vehicles::table
            .order(vehicles::id.asc())
            .load::<VehicleRecord>(&mut conn)
            .await?;
        Ok(records.into_iter().map(Vehicle::from).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<Vehicle>, StoreError> {
        let mut conn = self.pool.get().await?;
        let record = vehicles::table
            .find(id)
            .first::<VehicleRecord>(&mut conn)
            .await
            .optional()?;
        Ok(record.map(Vehicle::from))
    }

    /// Paginated listing with an optional brand filter, for the catalog API.
    pub async fn list(
        &self,
        brand: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Vehicle>, StoreError> {
        let mut conn = self.pool.get().await?;
        let mut query = vehicles::table.into_boxed();
        if let Some(brand) = brand {
            query = query.filter(vehicles::brand.like(format!("%{}%", brand)));
        }
        let records = query
            .order(vehicles::id.asc())
            .limit(limit)
            .offset(offset)
            .load::<VehicleRecord>(&mut conn)
            .await?;
        Ok(records.into_iter().map(Vehicle::from).collect())
    }

    /// Insert a vehicle row, replacing any existing row with the same id.
    /// Used by `init` seeding and tests; production rows come from upstream.
    pub async fn insert(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::replace_into(vehicles::table)
            .values(NewVehicleRecord {
                id: vehicle.id,
                brand: &vehicle.brand,
                model: &vehicle.model,
                description: &vehicle.description,
                engine: &vehicle.engine,
                period: &vehicle.period,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;
        Ok(vehicles::table
            .select(count_star())
            .first(&mut conn)
            .await?)
    }
}
