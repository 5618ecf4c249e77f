//! Report metadata store.
//!
//! Append-only: rows are inserted once per generation attempt and only ever
//! removed by the retention purge. `generated_at` is kept as fixed-width UTC
//! RFC 3339 text so string order equals time order.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};
use crate::models::{ReportMetadataRecord, ReportStatus, Section};
use crate::schema;

// ---

/// Open a pool on `url`, creating the database file when missing.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    // ---
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// The connection is never recycled, otherwise the database would vanish.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    // ---
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    schema::create_schema(&pool).await?;
    Ok(pool)
}

pub(crate) fn timestamp_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ReportError::Internal(format!("encode column: {e}")))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| ReportError::Internal(format!("decode column: {e}")))
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: String,
    entity_id: String,
    entity_type: String,
    period_start: String,
    period_end: String,
    sections: String,
    recipients: String,
    status: String,
    error_message: Option<String>,
    pdf_path: Option<String>,
    file_size_bytes: Option<i64>,
    generated_at: String,
}

impl TryFrom<ReportRow> for ReportMetadataRecord {
    type Error = ReportError;

    fn try_from(row: ReportRow) -> Result<Self> {
        // ---
        let generated_at = DateTime::parse_from_rfc3339(&row.generated_at)
            .map_err(|e| ReportError::Internal(format!("bad generated_at '{}': {e}", row.generated_at)))?
            .with_timezone(&Utc);

        Ok(ReportMetadataRecord {
            id: row.id,
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            period_start: row.period_start,
            period_end: row.period_end,
            sections: from_json::<Vec<Section>>(&row.sections)?,
            recipients: from_json(&row.recipients)?,
            status: ReportStatus::from_str(&row.status)?,
            error_message: row.error_message,
            pdf_path: row.pdf_path,
            file_size_bytes: row.file_size_bytes,
            generated_at,
        })
    }
}

const SELECT_REPORT: &str = r#"
    SELECT id, entity_id, entity_type, period_start, period_end, sections, recipients,
           status, error_message, pdf_path, file_size_bytes, generated_at
    FROM reports
"#;

#[derive(Clone)]
pub struct ReportStore {
    pool: SqlitePool,
}

impl ReportStore {
    pub fn new(pool: SqlitePool) -> Self {
        ReportStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn save(&self, record: &ReportMetadataRecord) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, entity_id, entity_type, period_start, period_end, sections, recipients,
                status, error_message, pdf_path, file_size_bytes, generated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.entity_id)
        .bind(&record.entity_type)
        .bind(&record.period_start)
        .bind(&record.period_end)
        .bind(to_json(&record.sections)?)
        .bind(to_json(&record.recipients)?)
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .bind(&record.pdf_path)
        .bind(record.file_size_bytes)
        .bind(timestamp_text(record.generated_at))
        .execute(&self.pool)
        .await?;

        debug!(report_id = %record.id, status = record.status.as_str(), "Saved report metadata");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<ReportMetadataRecord>> {
        // ---
        let sql = format!("{SELECT_REPORT} WHERE id = ?");
        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReportMetadataRecord::try_from).transpose()
    }

    /// Newest-first page of an entity's reports plus the entity's total count.
    pub async fn history(
        &self,
        entity_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ReportMetadataRecord>, i64)> {
        // ---
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE entity_id = ?")
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!("{SELECT_REPORT} WHERE entity_id = ? ORDER BY generated_at DESC, id LIMIT ? OFFSET ?");
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(entity_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(ReportMetadataRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }

    /// Delete reports generated more than `days` ago, with their PDF files.
    pub async fn purge_older_than(&self, days: u32) -> Result<usize> {
        // ---
        let cutoff = timestamp_text(Utc::now() - Duration::days(i64::from(days)));

        let expired: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT id, pdf_path FROM reports WHERE generated_at < ?")
                .bind(&cutoff)
                .fetch_all(&self.pool)
                .await?;

        for (id, path) in &expired {
            let Some(path) = path else { continue };
            match tokio::fs::remove_file(Path::new(path)).await {
                Ok(()) => debug!(report_id = %id, path = %path, "Removed expired PDF"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(report_id = %id, path = %path, error = %e, "Could not remove expired PDF"),
            }
        }

        let deleted = sqlx::query("DELETE FROM reports WHERE generated_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(purged = deleted, retention_days = days, "Purged expired reports");
        Ok(deleted as usize)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{PeriodSpec, ReportRequest};
    use std::collections::HashSet;

    fn request(entity: &str) -> ReportRequest {
        ReportRequest {
            entity_id: entity.to_string(),
            entity_type: "site".into(),
            period: PeriodSpec {
                start: "2026-02-01T00:00:00Z".into(),
                end: "2026-02-28T23:59:59Z".into(),
            },
            sections: vec![Section::Summary, Section::Faults],
            emails: vec!["ops@example.com".into()],
            send_email: false,
        }
    }

    fn record(id: &str, entity: &str, age_days: i64) -> ReportMetadataRecord {
        let mut rec = ReportMetadataRecord::success(id, &request(entity), format!("/tmp/{id}.pdf"), 1024);
        rec.generated_at = Utc::now() - Duration::days(age_days);
        rec
    }

    async fn store() -> ReportStore {
        ReportStore::new(connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_save_and_get() {
        // ---
        let store = store().await;
        let rec = record("rpt-1", "site-1", 0);
        store.save(&rec).await.unwrap();

        let loaded = store.get("rpt-1").await.unwrap().unwrap();
        assert_eq!(loaded.sections, vec![Section::Summary, Section::Faults]);
        assert_eq!(loaded.recipients, vec!["ops@example.com".to_string()]);
        assert_eq!(loaded.status, ReportStatus::Success);
        assert_eq!(timestamp_text(loaded.generated_at), timestamp_text(rec.generated_at));

        assert!(store.get("rpt-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_rows_are_kept_alongside_reruns() {
        // ---
        let store = store().await;
        let err = ReportError::Connectivity("connection refused".into());
        store
            .save(&ReportMetadataRecord::failed("rpt-a", &request("site-1"), &err))
            .await
            .unwrap();
        store.save(&record("rpt-b", "site-1", 0)).await.unwrap();

        let (rows, total) = store.history("site-1", 10, 0).await.unwrap();
        assert_eq!(total, 2);
        let failed = rows.iter().find(|r| r.id == "rpt-a").unwrap();
        assert_eq!(failed.status, ReportStatus::Failed);
        assert!(failed.pdf_path.is_none());
        assert!(failed.error_message.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_history_pages_are_disjoint() {
        // ---
        let store = store().await;
        for i in 0..5 {
            store.save(&record(&format!("rpt-{i}"), "site-1", i)).await.unwrap();
        }
        store.save(&record("rpt-other", "site-2", 0)).await.unwrap();

        let (first, total_a) = store.history("site-1", 2, 0).await.unwrap();
        let (second, total_b) = store.history("site-1", 2, 2).await.unwrap();

        assert_eq!((total_a, total_b), (5, 5));
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);

        let a: HashSet<_> = first.iter().map(|r| r.id.clone()).collect();
        let b: HashSet<_> = second.iter().map(|r| r.id.clone()).collect();
        assert!(a.is_disjoint(&b));

        // newest first
        assert_eq!(first[0].id, "rpt-0");
        assert_eq!(second[1].id, "rpt-3");
    }

    #[tokio::test]
    async fn test_purge_respects_cutoff_and_removes_files() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let old_pdf = dir.path().join("rpt-old.pdf");
        let new_pdf = dir.path().join("rpt-new.pdf");
        std::fs::write(&old_pdf, b"%PDF-old").unwrap();
        std::fs::write(&new_pdf, b"%PDF-new").unwrap();

        let store = store().await;
        let mut old = record("rpt-old", "site-1", 100);
        old.pdf_path = Some(old_pdf.to_string_lossy().into_owned());
        let mut new = record("rpt-new", "site-1", 10);
        new.pdf_path = Some(new_pdf.to_string_lossy().into_owned());
        store.save(&old).await.unwrap();
        store.save(&new).await.unwrap();

        let purged = store.purge_older_than(90).await.unwrap();

        assert_eq!(purged, 1);
        assert!(store.get("rpt-old").await.unwrap().is_none());
        assert!(store.get("rpt-new").await.unwrap().is_some());
        assert!(!old_pdf.exists());
        assert!(new_pdf.exists());
    }

    #[tokio::test]
    async fn test_purge_tolerates_missing_files() {
        // ---
        let store = store().await;
        store.save(&record("rpt-gone", "site-1", 200)).await.unwrap();
        assert_eq!(store.purge_older_than(90).await.unwrap(), 1);
        assert_eq!(store.purge_older_than(90).await.unwrap(), 0);
    }
}
