//! Report generation pipeline.
//!
//! hierarchy → per-device telemetry → charts → PDF → metadata row → email.
//! Every attempt leaves exactly one metadata row, success or failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::email::{attachment_name, subject_line, EmailOutcome, ReportMail, ReportMailer};
use crate::error::{ReportError, Result};
use crate::models::{
    DeviceRow, DeviceStatus, EntityKind, FaultRow, HierarchyResult, PlatformEntityType, ReportData,
    ReportMetadataRecord, ReportRequest, ReportResult, Section,
};
use crate::platform::{hierarchy, numeric_value, AlarmRecord, Platform};
use crate::render::{generate_all_charts, DocumentRenderer};
use crate::report::period::{choose_trend_interval, parse_iso, period_label};
use crate::report::trend::{aggregate_trend, average_trend, round_to, scale_series, series_stats, DeviceTrends};
use crate::scheduler::ReportRunner;
use crate::store::ReportStore;

// ---

pub const ENERGY_KEY: &str = "energy_wh";
pub const CO2_KEY: &str = "co2_grams";
pub const DIM_KEY: &str = "dim_level";
pub const LAST_ACTIVITY_KEY: &str = "lastActivityTime";

/// A device seen within this window counts as online.
pub const ONLINE_WINDOW_MS: i64 = 600_000;

const ROW_TIME_FORMAT: &str = "%d %b %H:%M";

/// Fault beats activity; otherwise recent activity means online.
pub fn classify_device(has_active_fault: bool, last_activity_ms: i64, now_ms: i64) -> DeviceStatus {
    if has_active_fault {
        DeviceStatus::Fault
    } else if last_activity_ms > 0 && now_ms - last_activity_ms < ONLINE_WINDOW_MS {
        DeviceStatus::Online
    } else {
        DeviceStatus::Offline
    }
}

fn format_ms(ts_ms: i64, fmt: &str) -> String {
    DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format(fmt).to_string())
        .unwrap_or_default()
}

/// Alarm duration label: `Nm`, `Hh Mm`, `Dd Hh`, `ongoing`, or empty.
pub fn format_duration(alarm: &AlarmRecord) -> String {
    // ---
    match alarm.cleared_at() {
        Some(cleared) if cleared > alarm.created_time => {
            let secs = (cleared - alarm.created_time) / 1000;
            if secs < 3600 {
                format!("{}m", secs / 60)
            } else if secs < 86_400 {
                format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
            } else {
                format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
            }
        }
        _ if alarm.is_active() => "ongoing".to_string(),
        _ => String::new(),
    }
}

pub fn fault_row(alarm: &AlarmRecord, site_name: &str) -> FaultRow {
    // ---
    FaultRow {
        date: format_ms(alarm.created_time, ROW_TIME_FORMAT),
        site: site_name.to_string(),
        device: alarm.originator_name.clone().unwrap_or_else(|| "Unknown".into()),
        alarm_type: alarm.alarm_type.clone().unwrap_or_else(|| "Unknown".into()),
        severity: alarm.severity.clone().unwrap_or_else(|| "MAJOR".into()),
        status: if alarm.is_active() { "Active" } else { "Cleared" }.to_string(),
        duration: format_duration(alarm),
        created_time: alarm.created_time,
    }
}

pub fn download_url(public_base_url: &str, report_id: &str) -> String {
    format!(
        "{}/api/report/download/{}",
        public_base_url.trim_end_matches('/'),
        report_id
    )
}

/// Period window resolved from a request.
struct Window {
    start_ms: i64,
    end_ms: i64,
    label: String,
}

fn parse_window(request: &ReportRequest) -> Result<Window> {
    // ---
    let start = parse_iso(&request.period.start)?;
    let end = parse_iso(&request.period.end)?;
    if start >= end {
        return Err(ReportError::Validation(format!(
            "period start '{}' must be before end '{}'",
            request.period.start, request.period.end
        )));
    }
    Ok(Window {
        start_ms: start.timestamp_millis(),
        end_ms: end.timestamp_millis(),
        label: period_label(start, end),
    })
}

// ---

/// Runs report requests end to end.
pub struct ReportService {
    platform: Arc<dyn Platform>,
    store: ReportStore,
    renderer: Arc<DocumentRenderer>,
    mailer: Option<Arc<dyn ReportMailer>>,
    storage_root: PathBuf,
    public_base_url: String,
}

impl ReportService {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: ReportStore,
        renderer: Arc<DocumentRenderer>,
        mailer: Option<Arc<dyn ReportMailer>>,
        storage_root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        ReportService {
            platform,
            store,
            renderer,
            mailer,
            storage_root: storage_root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Generate one report. On any failure a `failed` metadata row is saved
    /// before the error is returned.
    pub async fn generate(&self, request: &ReportRequest) -> Result<ReportResult> {
        // ---
        let report_id = format!("rpt-{}", Uuid::new_v4());
        info!(
            report_id = %report_id,
            entity_id = %request.entity_id,
            entity_type = %request.entity_type,
            "Report generation starting"
        );

        match self.run_pipeline(&report_id, request).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(report_id = %report_id, entity_id = %request.entity_id, error = %e, "Report generation failed");
                let record = ReportMetadataRecord::failed(&report_id, request, &e);
                if let Err(store_err) = self.store.save(&record).await {
                    error!(report_id = %report_id, error = %store_err, "Could not record failed report");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, report_id: &str, request: &ReportRequest) -> Result<ReportResult> {
        // ---
        let kind = EntityKind::parse(&request.entity_type)?;
        let window = parse_window(request)?;

        let tree = hierarchy::resolve(self.platform.as_ref(), &request.entity_id, kind.platform_type()).await?;
        let data = self.assemble(&tree, request, &window).await?;

        let renderer = Arc::clone(&self.renderer);
        let sections = request.sections.clone();
        let (data, pdf) = tokio::task::spawn_blocking(move || -> Result<(ReportData, Vec<u8>)> {
            let mut data = data;
            data.charts = generate_all_charts(&data, &sections)?;
            let pdf = renderer.render(&data, &sections)?;
            Ok((data, pdf))
        })
        .await
        .map_err(|e| ReportError::Internal(format!("render task failed: {e}")))??;

        tokio::fs::create_dir_all(&self.storage_root).await?;
        let pdf_path = self.storage_root.join(format!("{report_id}.pdf"));
        tokio::fs::write(&pdf_path, &pdf).await?;
        info!(report_id, path = %pdf_path.display(), bytes = pdf.len(), "Saved PDF");

        let record = ReportMetadataRecord::success(
            report_id,
            request,
            pdf_path.to_string_lossy().into_owned(),
            pdf.len() as i64,
        );
        self.store.save(&record).await?;

        let url = download_url(&self.public_base_url, report_id);
        let mut message = format!("Report generated for {} ({})", data.entity_name, data.period);

        if request.send_email && !request.emails.is_empty() {
            let outcome = self.dispatch_email(&data, pdf, &request.emails, &url).await;
            if outcome.sent {
                message.push_str(&format!(" and sent to {} recipient(s)", outcome.recipients.len()));
            } else {
                let reason = outcome.error.unwrap_or_else(|| "unknown error".into());
                message.push_str(&format!(". Email failed: {reason}"));
            }
        }

        info!(
            report_id,
            devices = data.device_count,
            sites = data.site_count,
            faults = data.faults.len(),
            "Report generation complete"
        );

        Ok(ReportResult {
            status: "success".into(),
            report_id: report_id.to_string(),
            message,
            download_url: url,
            generated_at: record.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    async fn dispatch_email(
        &self,
        data: &ReportData,
        pdf: Vec<u8>,
        recipients: &[String],
        url: &str,
    ) -> EmailOutcome {
        // ---
        let Some(mailer) = &self.mailer else {
            warn!(recipients = ?recipients, "Email requested but no SMTP host is configured");
            return EmailOutcome::failed(recipients, "Email delivery is not configured");
        };

        let html_body = match self.renderer.render_email_body(data, url) {
            Ok(body) => body,
            Err(e) => return EmailOutcome::failed(recipients, e.to_string()),
        };

        let mail = ReportMail {
            recipients: recipients.to_vec(),
            subject: subject_line(&data.entity_name, &data.period),
            html_body,
            attachment_name: attachment_name(&data.entity_name, &data.period),
            pdf,
        };
        mailer.send_report(mail).await
    }

    /// Walk every device and build the renderer payload (charts excluded).
    async fn assemble(
        &self,
        tree: &HierarchyResult,
        request: &ReportRequest,
        window: &Window,
    ) -> Result<ReportData> {
        // ---
        let (start, end) = (window.start_ms, window.end_ms);
        let (interval_ms, interval_label) = choose_trend_interval(start, end);
        let wants_alarms = request.wants(Section::Faults) || request.wants(Section::Summary);
        let wants_trend = request.wants(Section::Energy) || request.wants(Section::Co2);
        let now_ms = Utc::now().timestamp_millis();

        let mut devices = Vec::with_capacity(tree.device_count());
        let mut faults = Vec::new();
        let mut device_trends: Vec<DeviceTrends> = Vec::new();
        let mut dim_trends: Vec<DeviceTrends> = Vec::new();
        let (mut online, mut offline, mut fault) = (0usize, 0usize, 0usize);
        let (mut total_wh, mut total_g) = (0.0f64, 0.0f64);

        for site in &tree.sites {
            for device in &site.devices {
                debug!(device_id = %device.id, site = %site.name, "Collecting device telemetry");

                let energy_wh = self.platform.get_telemetry_sum(&device.id, ENERGY_KEY, start, end).await?;
                let co2_g = self.platform.get_telemetry_sum(&device.id, CO2_KEY, start, end).await?;
                total_wh += energy_wh;
                total_g += co2_g;

                let attrs: HashMap<String, serde_json::Value> = self
                    .platform
                    .get_attributes(&device.id, PlatformEntityType::Device, "SERVER_SCOPE", &[LAST_ACTIVITY_KEY])
                    .await?;
                let last_activity = attrs
                    .get(LAST_ACTIVITY_KEY)
                    .and_then(numeric_value)
                    .map(|v| v as i64)
                    .unwrap_or(0);

                let mut has_active_fault = false;
                if wants_alarms {
                    let alarms = self
                        .platform
                        .get_alarm_history(&device.id, PlatformEntityType::Device, start, end)
                        .await?;
                    has_active_fault = alarms.iter().any(AlarmRecord::is_active);
                    if request.wants(Section::Faults) {
                        faults.extend(alarms.iter().map(|a| fault_row(a, &site.name)));
                    }
                }

                let status = classify_device(has_active_fault, last_activity, now_ms);
                match status {
                    DeviceStatus::Online => online += 1,
                    DeviceStatus::Offline => offline += 1,
                    DeviceStatus::Fault => fault += 1,
                }

                if wants_trend {
                    let trend = self
                        .platform
                        .get_telemetry_trend(&device.id, &[ENERGY_KEY, CO2_KEY], start, end, interval_ms)
                        .await?;
                    device_trends.push(trend);
                }

                if let Some(dim) = self
                    .platform
                    .get_optional_trend(&device.id, DIM_KEY, start, end, interval_ms)
                    .await?
                {
                    dim_trends.push(HashMap::from([(DIM_KEY.to_string(), dim)]));
                }

                devices.push(DeviceRow {
                    name: device.name.clone(),
                    site: site.name.clone(),
                    status,
                    last_active: if last_activity > 0 {
                        format_ms(last_activity, ROW_TIME_FORMAT)
                    } else {
                        String::new()
                    },
                    energy_kwh: round_to(energy_wh / 1000.0, 2),
                    co2_kg: round_to(co2_g / 1000.0, 2),
                });
            }
        }

        faults.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        devices.sort_by(|a, b| b.energy_kwh.total_cmp(&a.energy_kwh));

        let energy_trend = scale_series(aggregate_trend(&device_trends, ENERGY_KEY), 1000.0);
        let co2_trend = scale_series(aggregate_trend(&device_trends, CO2_KEY), 1000.0);
        let dim_trend = if dim_trends.is_empty() {
            None
        } else {
            Some(average_trend(&dim_trends, DIM_KEY))
        };

        let (daily_avg_kwh, peak_kwh) = series_stats(&energy_trend);
        let (daily_avg_co2, peak_co2) = series_stats(&co2_trend);
        let alarm_count = faults.len();

        Ok(ReportData {
            entity_name: tree.name.clone(),
            entity_type: request.entity_type.clone(),
            period: window.label.clone(),
            generated_date: Utc::now().format("%d %b %Y %H:%M UTC").to_string(),
            site_count: tree.sites.len(),
            device_count: online + offline + fault,
            online_count: online,
            offline_count: offline,
            fault_count: fault,
            energy_kwh: round_to(total_wh / 1000.0, 2),
            co2_kg: round_to(total_g / 1000.0, 2),
            energy_trend,
            co2_trend,
            dim_trend,
            daily_avg_kwh,
            peak_kwh,
            daily_avg_co2,
            peak_co2,
            interval_label: interval_label.to_string(),
            devices,
            faults,
            alarm_count,
            charts: Default::default(),
        })
    }
}

#[async_trait]
impl ReportRunner for ReportService {
    async fn run_report(&self, request: ReportRequest) -> Result<ReportResult> {
        self.generate(&request).await
    }
}
