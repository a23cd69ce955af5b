//! Per-vehicle failure bookkeeping with a retry schedule derived from the
//! error kind.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::models::{ErrorKind, FailureRecord};
use crate::schema::scraper_failures;

use super::records::{FailureRecordRow, NewFailureRecord};
use super::{AsyncSqlitePool, StoreError};

#[derive(Clone)]
pub struct FailureRepository {
    pool: AsyncSqlitePool,
}

impl FailureRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Record a failure for a vehicle. The first occurrence creates the row
    /// with attempts = 1; later occurrences increment the counter, refresh
    /// the message and schedule, and clear any resolution.
    pub async fn upsert(
        &self,
        vehicle_id: i32,
        kind: ErrorKind,
        message: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let next_attempt = kind.retry_after().map(|d| (now + d).to_rfc3339());

        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            scraper_failures::table.filter(scraper_failures::vehicle_id.eq(vehicle_id)),
        )
        .set((
            scraper_failures::error_kind.eq(kind.as_str()),
            scraper_failures::message.eq(message),
            scraper_failures::attempts.eq(scraper_failures::attempts + 1),
            scraper_failures::last_attempt.eq(&now_str),
            scraper_failures::next_attempt.eq(next_attempt.as_deref()),
            scraper_failures::resolved.eq(0),
            scraper_failures::resolved_at.eq(None::<&str>),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            diesel::insert_into(scraper_failures::table)
                .values(NewFailureRecord {
                    vehicle_id,
                    error_kind: kind.as_str(),
                    message,
                    attempts: 1,
                    last_attempt: &now_str,
                    next_attempt: next_attempt.as_deref(),
                    resolved: 0,
                    resolved_at: None,
                    created_at: &now_str,
                })
                .execute(&mut conn)
                .await?;
        }
        Ok(())
    }

    /// Mark a previously failed vehicle as resolved.
    pub async fn mark_resolved(&self, vehicle_id: i32) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        diesel::update(scraper_failures::table.filter(scraper_failures::vehicle_id.eq(vehicle_id)))
            .set((
                scraper_failures::resolved.eq(1),
                scraper_failures::resolved_at.eq(Some(now.as_str())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, vehicle_id: i32) -> Result<Option<FailureRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row = scraper_failures::table
            .filter(scraper_failures::vehicle_id.eq(vehicle_id))
            .first::<FailureRecordRow>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(FailureRecord::from))
    }

    /// Unresolved failures whose retry time has passed (or that have no
    /// schedule at all), oldest schedule first.
    pub async fn pending_retries(&self, limit: i64) -> Result<Vec<FailureRecord>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        let rows = scraper_failures::table
            .filter(scraper_failures::resolved.eq(0))
            .filter(
                scraper_failures::next_attempt
                    .is_null()
                    .or(scraper_failures::next_attempt.le(&now)),
            )
            .order((
                scraper_failures::next_attempt.asc(),
                scraper_failures::attempts.asc(),
            ))
            .limit(limit)
            .load::<FailureRecordRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(FailureRecord::from).collect())
    }

    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;
        Ok(scraper_failures::table
            .filter(scraper_failures::resolved.eq(0))
            .select(count_star())
            .first(&mut conn)
            .await?)
    }

    /// Unresolved failure counts grouped by error kind.
    pub async fn stats(&self) -> Result<HashMap<ErrorKind, i64>, StoreError> {
        use diesel::dsl::count_star;
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = scraper_failures::table
            .filter(scraper_failures::resolved.eq(0))
            .group_by(scraper_failures::error_kind)
            .select((scraper_failures::error_kind, count_star()))
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(kind, count)| (ErrorKind::from_str(&kind), count))
            .collect())
    }

    /// Delete resolved records older than the given age. Returns rows removed.
    pub async fn purge_resolved(&self, older_than: Duration) -> Result<usize, StoreError> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let mut conn = self.pool.get().await?;
        Ok(diesel::delete(
            scraper_failures::table
                .filter(scraper_failures::resolved.eq(1))
                .filter(scraper_failures::resolved_at.lt(&cutoff)),
        )
        .execute(&mut conn)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{init_schema, AsyncSqlitePool, VehicleRepository};
    use super::*;
    use crate::models::Vehicle;
    use tempfile::tempdir;

    async fn setup() -> (FailureRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        init_schema(&pool).await.unwrap();

        let vehicles = VehicleRepository::new(pool.clone());
        for id in 1..=2 {
            vehicles
                .insert(&Vehicle {
                    id,
                    brand: "Fiat".into(),
                    model: "Uno".into(),
                    description: format!("Uno {}", id),
                    engine: String::new(),
                    period: String::new(),
                })
                .await
                .unwrap();
        }

        (FailureRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn test_upsert_increments_attempts() {
        let (repo, _dir) = setup().await;

        repo.upsert(1, ErrorKind::Network, "connection refused")
            .await
            .unwrap();
        let first = repo.get(1).await.unwrap().unwrap();
        assert_eq!(first.attempts, 1);
        assert!(!first.resolved);
        assert!(first.next_attempt.is_some());

        repo.upsert(1, ErrorKind::AdvisorApi, "Motul API error (status 500)")
            .await
            .unwrap();
        let second = repo.get(1).await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.error_kind, ErrorKind::AdvisorApi);
    }

    #[tokio::test]
    async fn test_model_not_found_never_retries() {
        let (repo, _dir) = setup().await;

        repo.upsert(1, ErrorKind::ModelNotFound, "LLM indicated no match")
            .await
            .unwrap();
        let record = repo.get(1).await.unwrap().unwrap();
        assert!(record.next_attempt.is_none());

        // Null schedule still counts as pending (manual retry is allowed).
        let pending = repo.pending_retries(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_flow() {
        let (repo, _dir) = setup().await;

        repo.upsert(2, ErrorKind::Network, "timeout").await.unwrap();
        repo.mark_resolved(2).await.unwrap();

        let record = repo.get(2).await.unwrap().unwrap();
        assert!(record.resolved);
        assert!(record.resolved_at.is_some());
        assert_eq!(repo.count_pending().await.unwrap(), 0);

        // A new failure clears the resolution again.
        repo.upsert(2, ErrorKind::Parse, "invalid payload")
            .await
            .unwrap();
        let record = repo.get(2).await.unwrap().unwrap();
        assert!(!record.resolved);
        assert!(record.resolved_at.is_none());
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn test_stats_groups_by_kind() {
        let (repo, _dir) = setup().await;

        repo.upsert(1, ErrorKind::Network, "timeout").await.unwrap();
        repo.upsert(2, ErrorKind::RateLimit, "429").await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.get(&ErrorKind::Network), Some(&1));
        assert_eq!(stats.get(&ErrorKind::RateLimit), Some(&1));
    }
}
