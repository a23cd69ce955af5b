//! Idempotent schema creation.
//!
//! The `vehicles` table is owned by the upstream catalog in production; it is
//! created here as well so local databases and tests are self-contained.

use diesel_async::SimpleAsyncConnection;

use super::{AsyncSqlitePool, StoreError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        id INTEGER PRIMARY KEY,
        brand TEXT NOT NULL,
        model TEXT NOT NULL,
        description TEXT NOT NULL,
        engine TEXT NOT NULL DEFAULT '',
        period TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS oil_specifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vehicle_id INTEGER NOT NULL,
        fluid_type TEXT NOT NULL,
        viscosity TEXT,
        capacity TEXT,
        norm TEXT,
        recommendation TEXT,
        observation TEXT,
        source TEXT NOT NULL,
        external_type_id TEXT,
        confidence REAL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (vehicle_id) REFERENCES vehicles(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_oil_specs_vehicle
        ON oil_specifications(vehicle_id);
    CREATE INDEX IF NOT EXISTS idx_oil_specs_fluid_type
        ON oil_specifications(fluid_type);
    CREATE INDEX IF NOT EXISTS idx_oil_specs_source
        ON oil_specifications(source);

    CREATE TABLE IF NOT EXISTS scraper_failures (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vehicle_id INTEGER NOT NULL UNIQUE,
        error_kind TEXT NOT NULL,
        message TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 1,
        last_attempt TEXT NOT NULL,
        next_attempt TEXT,
        resolved INTEGER NOT NULL DEFAULT 0,
        resolved_at TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (vehicle_id) REFERENCES vehicles(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_failures_next_attempt
        ON scraper_failures(next_attempt) WHERE resolved = 0;
    CREATE INDEX IF NOT EXISTS idx_failures_kind
        ON scraper_failures(error_kind) WHERE resolved = 0;
"#;

/// Create all tables and indexes if they do not already exist.
pub async fn init_schema(pool: &AsyncSqlitePool) -> Result<(), StoreError> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA).await?;
    Ok(())
}
