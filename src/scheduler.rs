//! Recurring report jobs.
//!
//! One job per entity (`schedule_<entityId>`), each fired on a cron trigger
//! to generate the report for the previous calendar period. Jobs live in a
//! durable [`JobStore`] and are reloaded by [`Scheduler::start`].
//!
//! All mutations and the due-job claim happen under one lock, so a replaced
//! job can never fire with its old payload once the replacement returned.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use cron::Schedule;
use sqlx::{FromRow, SqlitePool};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ReportError, Result};
use crate::models::{
    EntityKind, Frequency, PeriodSpec, ReportRequest, ReportResult, ScheduleRecord,
    ScheduleRequest, ScheduleResponse, ScheduleStatus, Section,
};
use crate::report::period::calculate_previous_period;
use crate::store::{from_json, timestamp_text, to_json};

// ---

/// Whatever turns a report request into a generated report.
#[async_trait]
pub trait ReportRunner: Send + Sync {
    async fn run_report(&self, request: ReportRequest) -> Result<ReportResult>;
}

/// Durable backing store for schedule records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ScheduleRecord>>;
    async fn upsert(&self, record: &ScheduleRecord) -> Result<()>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Six-field cron expression (`sec min hour day month weekday`).
pub fn cron_expression(frequency: Frequency, day_of_month: u32, hour: u32, minute: u32) -> String {
    let months = match frequency {
        Frequency::Monthly => "*",
        Frequency::Quarterly => "1,4,7,10",
        Frequency::Yearly => "1",
    };
    format!("0 {minute} {hour} {day_of_month} {months} *")
}

/// First trigger time strictly after `after`.
pub fn next_run_after(record: &ScheduleRecord, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    // ---
    let expr = cron_expression(record.frequency, record.day_of_month, record.hour, record.minute);
    let schedule = Schedule::from_str(&expr)
        .map_err(|e| ReportError::Validation(format!("Invalid trigger '{expr}': {e}")))?;
    Ok(schedule.after(&after).next())
}

/// Parse `"HH:MM"` (24h, UTC).
pub fn parse_time_utc(raw: &str) -> Result<(u32, u32)> {
    // ---
    let invalid = || ReportError::Validation(format!("timeUtc must be HH:MM, got '{raw}'"));
    let (h, m) = raw.trim().split_once(':').ok_or_else(invalid)?;
    if !(1..=2).contains(&h.len()) || m.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Validate a schedule request into the record that will be stored.
pub fn validate_request(request: &ScheduleRequest) -> Result<ScheduleRecord> {
    // ---
    let entity_id = request.entity_id.trim();
    if entity_id.is_empty() {
        return Err(ReportError::Validation("entityId is required".into()));
    }
    EntityKind::parse(&request.entity_type)?;
    let frequency = Frequency::from_str(&request.frequency)?;
    if !(1..=31).contains(&request.day_of_month) {
        return Err(ReportError::Validation(format!(
            "dayOfMonth must be between 1 and 31, got {}",
            request.day_of_month
        )));
    }
    let (hour, minute) = parse_time_utc(&request.time_utc)?;

    Ok(ScheduleRecord {
        id: ScheduleRecord::job_id_for(entity_id),
        entity_id: entity_id.to_string(),
        entity_type: request.entity_type.trim().to_ascii_lowercase(),
        frequency,
        day_of_month: request.day_of_month,
        hour,
        minute,
        sections: request.sections.clone(),
        recipients: request.emails.clone(),
        enabled: request.enabled,
    })
}

// ---

struct Entry {
    record: ScheduleRecord,
    /// `None` while paused.
    next_run: Option<DateTime<Utc>>,
}

impl Entry {
    fn response(&self) -> ScheduleResponse {
        ScheduleResponse {
            status: if self.next_run.is_some() {
                ScheduleStatus::Active
            } else {
                ScheduleStatus::Paused
            },
            schedule_id: self.record.id.clone(),
            next_run: self
                .next_run
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            frequency: self.record.frequency.to_string(),
            enabled: self.record.enabled,
        }
    }
}

fn entry_for(record: ScheduleRecord, now: DateTime<Utc>) -> Result<Entry> {
    let next_run = if record.enabled {
        next_run_after(&record, now)?
    } else {
        None
    };
    Ok(Entry { record, next_run })
}

pub struct Scheduler {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn ReportRunner>,
    jobs: Mutex<HashMap<String, Entry>>,
    wake: Notify,
    poll: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, runner: Arc<dyn ReportRunner>, poll: Duration) -> Self {
        // ---
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Scheduler {
            store,
            runner,
            jobs: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            poll,
            shutdown_tx,
            shutdown_rx,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Load persisted jobs and spawn the trigger loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        // ---
        let records = self.store.load_all().await?;
        let now = Utc::now();
        {
            let mut jobs = self.jobs.lock().await;
            for record in records {
                let id = record.id.clone();
                match entry_for(record, now) {
                    Ok(entry) => {
                        jobs.insert(id, entry);
                    }
                    Err(e) => warn!(job_id = %id, error = %e, "Skipping unloadable schedule"),
                }
            }
            info!(jobs = jobs.len(), "Scheduler started");
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run_loop().await });
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        // ---
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            let sleep_for = self.time_until_next_due().await;
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.wake.notified() => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
            self.run_due_jobs(Utc::now()).await;
        }
    }

    async fn time_until_next_due(&self) -> Duration {
        // ---
        let now = Utc::now();
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter_map(|e| e.next_run)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .map_or(self.poll, |until| until.min(self.poll))
    }

    /// Claim every job due at `now` and run each on its own task.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        // ---
        let claimed: Vec<ScheduleRecord> = {
            let mut jobs = self.jobs.lock().await;
            let mut claimed = Vec::new();
            for entry in jobs.values_mut() {
                let Some(due) = entry.next_run else { continue };
                if due > now {
                    continue;
                }
                entry.next_run = match next_run_after(&entry.record, now) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(job_id = %entry.record.id, error = %e, "Could not compute next run");
                        None
                    }
                };
                claimed.push(entry.record.clone());
            }
            claimed
        };

        claimed
            .into_iter()
            .map(|record| {
                let runner = Arc::clone(&self.runner);
                tokio::spawn(run_job(runner, record, now))
            })
            .collect()
    }

    /// Create or replace the job for `request.entity_id`.
    pub async fn add(&self, request: &ScheduleRequest) -> Result<ScheduleResponse> {
        // ---
        let record = validate_request(request)?;
        let entry = entry_for(record, Utc::now())?;

        let response = {
            let mut jobs = self.jobs.lock().await;
            self.store.upsert(&entry.record).await?;
            let replaced = jobs.contains_key(&entry.record.id);
            let response = entry.response();
            info!(
                job_id = %entry.record.id,
                entity_id = %entry.record.entity_id,
                frequency = %entry.record.frequency,
                next_run = ?response.next_run,
                replaced,
                "Schedule saved"
            );
            jobs.insert(entry.record.id.clone(), entry);
            response
        };

        self.wake.notify_one();
        Ok(response)
    }

    pub async fn remove(&self, job_id: &str) -> Result<ScheduleResponse> {
        // ---
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get(job_id) else {
            return Err(ReportError::NotFound(format!("Schedule '{job_id}' not found")));
        };
        let response = ScheduleResponse {
            status: ScheduleStatus::Removed,
            enabled: false,
            next_run: None,
            ..entry.response()
        };

        self.store.delete(job_id).await?;
        jobs.remove(job_id);
        drop(jobs);

        info!(job_id = %job_id, "Schedule removed");
        self.wake.notify_one();
        Ok(response)
    }

    pub async fn get(&self, job_id: &str) -> Result<ScheduleResponse> {
        // ---
        let jobs = self.jobs.lock().await;
        jobs.get(job_id)
            .map(Entry::response)
            .ok_or_else(|| ReportError::NotFound(format!("Schedule '{job_id}' not found")))
    }

    pub async fn list(&self) -> Vec<ScheduleResponse> {
        // ---
        let jobs = self.jobs.lock().await;
        let mut all: Vec<ScheduleResponse> = jobs.values().map(Entry::response).collect();
        all.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        all
    }

    /// Signal the trigger loop to stop and wait for it, bounded by `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        // ---
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        let Some(handle) = handle else { return };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!("Scheduler task panicked: {}", e),
            Err(_) => warn!("Scheduler shutdown timed out after {:?}", timeout),
        }
    }
}

async fn run_job(runner: Arc<dyn ReportRunner>, record: ScheduleRecord, fired_at: DateTime<Utc>) {
    // ---
    let (start, end) = calculate_previous_period(record.frequency, fired_at);
    let request = ReportRequest {
        entity_id: record.entity_id.clone(),
        entity_type: record.entity_type.clone(),
        period: PeriodSpec { start, end },
        sections: record.sections.clone(),
        emails: record.recipients.clone(),
        send_email: true,
    };

    let started = Instant::now();
    info!(job_id = %record.id, entity_id = %record.entity_id, period_start = %request.period.start, "Scheduled report starting");

    match runner.run_report(request).await {
        Ok(result) => info!(
            job_id = %record.id,
            report_id = %result.report_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scheduled report completed"
        ),
        Err(e) => error!(
            job_id = %record.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %e,
            "Scheduled report failed"
        ),
    }
}

// ---

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: String,
    entity_id: String,
    entity_type: String,
    frequency: String,
    day_of_month: i64,
    time_utc: String,
    sections: String,
    recipients: String,
    enabled: bool,
}

impl TryFrom<ScheduleRow> for ScheduleRecord {
    type Error = ReportError;

    fn try_from(row: ScheduleRow) -> Result<Self> {
        // ---
        let (hour, minute) = parse_time_utc(&row.time_utc)?;
        Ok(ScheduleRecord {
            id: row.id,
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            frequency: Frequency::from_str(&row.frequency)?,
            day_of_month: u32::try_from(row.day_of_month)
                .map_err(|_| ReportError::Internal(format!("bad day_of_month {}", row.day_of_month)))?,
            hour,
            minute,
            sections: from_json::<Vec<Section>>(&row.sections)?,
            recipients: from_json(&row.recipients)?,
            enabled: row.enabled,
        })
    }
}

/// Job store on the `schedules` table.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteJobStore { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn load_all(&self) -> Result<Vec<ScheduleRecord>> {
        // ---
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, entity_id, entity_type, frequency, day_of_month, time_utc,
                   sections, recipients, enabled
            FROM schedules
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Loaded persisted schedules");
        rows.into_iter().map(ScheduleRecord::try_from).collect()
    }

    async fn upsert(&self, record: &ScheduleRecord) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO schedules (
                id, entity_id, entity_type, frequency, day_of_month, time_utc,
                sections, recipients, enabled, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                entity_type  = excluded.entity_type,
                frequency    = excluded.frequency,
                day_of_month = excluded.day_of_month,
                time_utc     = excluded.time_utc,
                sections     = excluded.sections,
                recipients   = excluded.recipients,
                enabled      = excluded.enabled,
                updated_at   = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.entity_id)
        .bind(&record.entity_type)
        .bind(record.frequency.as_str())
        .bind(i64::from(record.day_of_month))
        .bind(record.time_utc())
        .bind(to_json(&record.sections)?)
        .bind(to_json(&record.recipients)?)
        .bind(record.enabled)
        .bind(timestamp_text(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        // ---
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::connect_in_memory;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingRunner {
        requests: StdMutex<Vec<ReportRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportRunner for RecordingRunner {
        async fn run_report(&self, request: ReportRequest) -> Result<ReportResult> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ReportError::Connectivity("platform down".into()));
            }
            Ok(ReportResult {
                status: "success".into(),
                report_id: "rpt-test".into(),
                message: "ok".into(),
                download_url: String::new(),
                generated_at: String::new(),
            })
        }
    }

    fn request(entity: &str, frequency: &str) -> ScheduleRequest {
        ScheduleRequest {
            entity_id: entity.into(),
            entity_type: "estate".into(),
            frequency: frequency.into(),
            day_of_month: 1,
            time_utc: "06:00".into(),
            sections: vec![Section::Summary, Section::Energy],
            emails: vec!["ops@example.com".into()],
            enabled: true,
        }
    }

    async fn scheduler_with(runner: Arc<RecordingRunner>) -> (Arc<Scheduler>, SqlitePool) {
        let pool = connect_in_memory().await.unwrap();
        let store = Arc::new(SqliteJobStore::new(pool.clone()));
        let scheduler = Arc::new(Scheduler::new(store, runner, Duration::from_secs(30)));
        (scheduler, pool)
    }

    #[test]
    fn test_cron_expressions() {
        // ---
        assert_eq!(cron_expression(Frequency::Monthly, 1, 6, 0), "0 0 6 1 * *");
        assert_eq!(cron_expression(Frequency::Quarterly, 5, 7, 30), "0 30 7 5 1,4,7,10 *");
        assert_eq!(cron_expression(Frequency::Yearly, 2, 0, 15), "0 15 0 2 1 *");
    }

    #[test]
    fn test_next_run_is_strictly_after() {
        // ---
        let record = validate_request(&request("e1", "quarterly")).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let next = next_run_after(&record, now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap());

        let at_trigger = Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap();
        let following = next_run_after(&record, at_trigger).unwrap().unwrap();
        assert_eq!(following, Utc.with_ymd_and_hms(2026, 7, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_request_validation() {
        // ---
        let mut bad_day = request("e1", "monthly");
        bad_day.day_of_month = 32;
        assert!(matches!(validate_request(&bad_day), Err(ReportError::Validation(_))));

        let mut bad_time = request("e1", "monthly");
        bad_time.time_utc = "25:00".into();
        assert!(validate_request(&bad_time).is_err());
        bad_time.time_utc = "6am".into();
        assert!(validate_request(&bad_time).is_err());

        assert!(matches!(
            validate_request(&request("e1", "weekly")),
            Err(ReportError::Validation(_))
        ));

        let mut bad_type = request("e1", "monthly");
        bad_type.entity_type = "device".into();
        assert!(matches!(
            validate_request(&bad_type),
            Err(ReportError::UnsupportedEntityType(_))
        ));

        assert_eq!(parse_time_utc("7:05").unwrap(), (7, 5));
    }

    #[tokio::test]
    async fn test_add_twice_replaces() {
        // ---
        let (scheduler, pool) = scheduler_with(Arc::new(RecordingRunner::default())).await;

        let first = scheduler.add(&request("estate-1", "monthly")).await.unwrap();
        assert_eq!(first.schedule_id, "schedule_estate-1");
        assert_eq!(first.status, ScheduleStatus::Active);

        let second = scheduler.add(&request("estate-1", "yearly")).await.unwrap();
        assert_eq!(second.schedule_id, first.schedule_id);

        let all = scheduler.list().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].frequency, "yearly");

        let stored = SqliteJobStore::new(pool).load_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].frequency, Frequency::Yearly);
    }

    #[tokio::test]
    async fn test_disabled_job_is_paused_but_listed() {
        // ---
        let (scheduler, _pool) = scheduler_with(Arc::new(RecordingRunner::default())).await;
        let mut req = request("estate-2", "monthly");
        req.enabled = false;

        let resp = scheduler.add(&req).await.unwrap();
        assert_eq!(resp.status, ScheduleStatus::Paused);
        assert!(resp.next_run.is_none());
        assert!(!resp.enabled);

        let listed = scheduler.get("schedule_estate-2").await.unwrap();
        assert_eq!(listed.status, ScheduleStatus::Paused);
    }

    #[tokio::test]
    async fn test_remove_then_lookup_is_not_found() {
        // ---
        let (scheduler, _pool) = scheduler_with(Arc::new(RecordingRunner::default())).await;

        assert!(matches!(
            scheduler.remove("schedule_missing").await,
            Err(ReportError::NotFound(_))
        ));

        scheduler.add(&request("estate-3", "monthly")).await.unwrap();
        let removed = scheduler.remove("schedule_estate-3").await.unwrap();
        assert_eq!(removed.status, ScheduleStatus::Removed);
        assert!(!removed.enabled);
        assert_eq!(removed.next_run, None);

        assert!(matches!(
            scheduler.get("schedule_estate-3").await,
            Err(ReportError::NotFound(_))
        ));
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_jobs_survive_restart() {
        // ---
        let runner = Arc::new(RecordingRunner::default());
        let (scheduler, pool) = scheduler_with(runner.clone()).await;
        scheduler.add(&request("estate-4", "quarterly")).await.unwrap();

        let reloaded = Arc::new(Scheduler::new(
            Arc::new(SqliteJobStore::new(pool)),
            runner,
            Duration::from_secs(30),
        ));
        reloaded.start().await.unwrap();

        let resp = reloaded.get("schedule_estate-4").await.unwrap();
        assert_eq!(resp.frequency, "quarterly");
        assert!(resp.next_run.is_some());

        reloaded.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_due_job_runs_previous_period_with_email() {
        // ---
        let runner = Arc::new(RecordingRunner::default());
        let (scheduler, _pool) = scheduler_with(runner.clone()).await;
        scheduler.add(&request("estate-5", "monthly")).await.unwrap();

        let next = scheduler.get("schedule_estate-5").await.unwrap().next_run.unwrap();
        let fire_at = DateTime::parse_from_rfc3339(&next).unwrap().with_timezone(&Utc);

        // not yet due
        let early = scheduler.run_due_jobs(fire_at - chrono::Duration::seconds(1)).await;
        assert!(early.is_empty());

        for handle in scheduler.run_due_jobs(fire_at).await {
            handle.await.unwrap();
        }

        let requests = runner.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        let (start, end) = calculate_previous_period(Frequency::Monthly, fire_at);
        assert_eq!(requests[0].period.start, start);
        assert_eq!(requests[0].period.end, end);
        assert!(requests[0].send_email);
        assert_eq!(requests[0].emails, vec!["ops@example.com".to_string()]);

        // claimed: the same instant does not fire twice
        assert!(scheduler.run_due_jobs(fire_at).await.is_empty());
        let advanced = scheduler.get("schedule_estate-5").await.unwrap().next_run.unwrap();
        assert_ne!(advanced, next);
    }

    #[tokio::test]
    async fn test_failed_run_keeps_job() {
        // ---
        let runner = Arc::new(RecordingRunner { fail: true, ..Default::default() });
        let (scheduler, _pool) = scheduler_with(runner.clone()).await;
        scheduler.add(&request("estate-6", "yearly")).await.unwrap();

        let next = scheduler.get("schedule_estate-6").await.unwrap().next_run.unwrap();
        let fire_at = DateTime::parse_from_rfc3339(&next).unwrap().with_timezone(&Utc);
        for handle in scheduler.run_due_jobs(fire_at).await {
            handle.await.unwrap();
        }

        assert_eq!(runner.requests.lock().unwrap().len(), 1);
        let after = scheduler.get("schedule_estate-6").await.unwrap();
        assert_eq!(after.status, ScheduleStatus::Active);
    }

    #[tokio::test]
    async fn test_paused_job_never_fires() {
        // ---
        let runner = Arc::new(RecordingRunner::default());
        let (scheduler, _pool) = scheduler_with(runner.clone()).await;
        let mut req = request("estate-7", "monthly");
        req.enabled = false;
        scheduler.add(&req).await.unwrap();

        let far_future = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert!(scheduler.run_due_jobs(far_future).await.is_empty());
    }
}
