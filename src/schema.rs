//! Database schema management for `fleet-reports`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use sqlx::SqlitePool;

use crate::error::Result;

// ---

/// Create the report metadata and schedule tables (idempotent).
///
/// `reports` holds one row per generation attempt; `schedules` is the durable
/// job store the scheduler reloads on start. Safe to call on every startup.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per generation attempt, success or failure
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id              TEXT PRIMARY KEY,
            entity_id       TEXT    NOT NULL,
            entity_type     TEXT    NOT NULL,
            period_start    TEXT    NOT NULL,
            period_end      TEXT    NOT NULL,
            sections        TEXT    NOT NULL,
            recipients      TEXT    NOT NULL,
            status          TEXT    NOT NULL,
            error_message   TEXT,
            pdf_path        TEXT,
            file_size_bytes INTEGER,
            generated_at    TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id           TEXT PRIMARY KEY,
            entity_id    TEXT    NOT NULL UNIQUE,
            entity_type  TEXT    NOT NULL,
            frequency    TEXT    NOT NULL,
            day_of_month INTEGER NOT NULL,
            time_utc     TEXT    NOT NULL,
            sections     TEXT    NOT NULL,
            recipients   TEXT    NOT NULL,
            enabled      INTEGER NOT NULL,
            updated_at   TEXT    NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // History lookups and retention purges
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_reports_entity_id
            ON reports (entity_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_reports_generated_at
            ON reports (generated_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
