//! Repository layer for database persistence.
//!
//! All database access goes through Diesel with compile-time query checking
//! against the SQLite backend. Every operation reports a [`StoreError`],
//! which keeps the database path attached to connection failures.

mod failures;
mod migrations;
mod pool;
mod records;
mod specs;
mod vehicles;

pub use failures::FailureRepository;
pub use migrations::init_schema;
pub use pool::{AsyncSqlitePool, StoreError};
pub use specs::OilSpecRepository;
pub use vehicles::VehicleRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
