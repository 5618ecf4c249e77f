//! Data models for the reporting pipeline.
//!
//! Wire types (requests/responses) keep the camelCase field names the
//! dashboard widgets already send; persisted metadata rows are snake_case.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::render::ChartImage;

// ---

/// Report sections a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Summary,
    Energy,
    Co2,
    Faults,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Summary,
        Section::Energy,
        Section::Co2,
        Section::Faults,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::Energy => "energy",
            Section::Co2 => "co2",
            Section::Faults => "faults",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn default_sections() -> Vec<Section> {
    Section::ALL.to_vec()
}

// ---

/// Entity type tags used by the telemetry platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlatformEntityType {
    Asset,
    Device,
    Customer,
}

impl PlatformEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformEntityType::Asset => "ASSET",
            PlatformEntityType::Device => "DEVICE",
            PlatformEntityType::Customer => "CUSTOMER",
        }
    }
}

impl fmt::Display for PlatformEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity type as sent by report callers ("estate", "region", "site", "customer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Estate,
    Region,
    Site,
    Customer,
}

impl EntityKind {
    /// Parse a caller-supplied entity type, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self> {
        // ---
        match raw.trim().to_ascii_lowercase().as_str() {
            "estate" => Ok(EntityKind::Estate),
            "region" => Ok(EntityKind::Region),
            "site" => Ok(EntityKind::Site),
            "customer" => Ok(EntityKind::Customer),
            _ => Err(ReportError::UnsupportedEntityType(format!("'{raw}'"))),
        }
    }

    pub fn platform_type(&self) -> PlatformEntityType {
        match self {
            EntityKind::Estate | EntityKind::Region | EntityKind::Site => PlatformEntityType::Asset,
            EntityKind::Customer => PlatformEntityType::Customer,
        }
    }
}

/// Level of an asset in the containment hierarchy, read from its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetLevel {
    Estate,
    Region,
    Site,
}

impl AssetLevel {
    pub fn from_asset_type(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "estate" => Some(AssetLevel::Estate),
            "region" => Some(AssetLevel::Region),
            "site" => Some(AssetLevel::Site),
            _ => None,
        }
    }
}

// ---

/// Leaf of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteNode {
    pub id: String,
    pub name: String,
    pub devices: Vec<DeviceNode>,
}

/// Flattened hierarchy below the requested root entity.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyResult {
    pub id: String,
    pub name: String,
    pub entity_type: PlatformEntityType,
    pub asset_level: Option<AssetLevel>,
    pub sites: Vec<SiteNode>,
}

impl HierarchyResult {
    pub fn device_count(&self) -> usize {
        self.sites.iter().map(|s| s.devices.len()).sum()
    }
}

/// One aggregated bucket of a telemetry trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub ts: i64,
    pub value: f64,
}

pub type TrendSeries = Vec<TrendPoint>;

// ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSpec {
    pub start: String,
    pub end: String,
}

/// Body of `POST /api/report/generate`.
///
/// `entity_type` stays a raw string so that an unsupported value is still
/// recorded in the report history before the request is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub entity_id: String,
    pub entity_type: String,
    pub period: PeriodSpec,
    #[serde(default = "default_sections")]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub send_email: bool,
}

impl ReportRequest {
    pub fn wants(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub status: String,
    pub report_id: String,
    pub message: String,
    pub download_url: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Success => "success",
            ReportStatus::Failed => "failed",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(ReportStatus::Success),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(ReportError::Internal(format!("Unknown report status: '{other}'"))),
        }
    }
}

/// One persisted row per generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadataRecord {
    pub id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub period_start: String,
    pub period_end: String,
    pub sections: Vec<Section>,
    pub recipients: Vec<String>,
    pub status: ReportStatus,
    pub error_message: Option<String>,
    pub pdf_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

impl ReportMetadataRecord {
    // ---
    fn from_request(id: &str, request: &ReportRequest, status: ReportStatus) -> Self {
        ReportMetadataRecord {
            id: id.to_string(),
            entity_id: request.entity_id.clone(),
            entity_type: request.entity_type.clone(),
            period_start: request.period.start.clone(),
            period_end: request.period.end.clone(),
            sections: request.sections.clone(),
            recipients: request.emails.clone(),
            status,
            error_message: None,
            pdf_path: None,
            file_size_bytes: None,
            generated_at: Utc::now(),
        }
    }

    pub fn success(id: &str, request: &ReportRequest, pdf_path: String, size: i64) -> Self {
        ReportMetadataRecord {
            pdf_path: Some(pdf_path),
            file_size_bytes: Some(size),
            ..Self::from_request(id, request, ReportStatus::Success)
        }
    }

    pub fn failed(id: &str, request: &ReportRequest, error: &ReportError) -> Self {
        ReportMetadataRecord {
            error_message: Some(error.to_string()),
            ..Self::from_request(id, request, ReportStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportHistory {
    pub reports: Vec<ReportMetadataRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ---

/// Recurrence of a scheduled report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(ReportError::Validation(format!("Unknown frequency: '{s}'"))),
        }
    }
}

fn default_day_of_month() -> u32 {
    1
}

fn default_time_utc() -> String {
    "06:00".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Body of `POST /api/report/schedule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub entity_id: String,
    pub entity_type: String,
    pub frequency: String,
    #[serde(default = "default_day_of_month")]
    pub day_of_month: u32,
    #[serde(default = "default_time_utc")]
    pub time_utc: String,
    #[serde(default = "default_sections")]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A validated, persisted recurring job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub frequency: Frequency,
    pub day_of_month: u32,
    pub hour: u32,
    pub minute: u32,
    pub sections: Vec<Section>,
    pub recipients: Vec<String>,
    pub enabled: bool,
}

impl ScheduleRecord {
    pub fn job_id_for(entity_id: &str) -> String {
        format!("schedule_{entity_id}")
    }

    pub fn time_utc(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub status: ScheduleStatus,
    pub schedule_id: String,
    pub next_run: Option<String>,
    pub frequency: String,
    pub enabled: bool,
}

// ---

/// Three-way device classification; an active fault wins over activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    Online,
    Offline,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRow {
    pub name: String,
    pub site: String,
    pub status: DeviceStatus,
    pub last_active: String,
    pub energy_kwh: f64,
    pub co2_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRow {
    pub date: String,
    pub site: String,
    pub device: String,
    pub alarm_type: String,
    pub severity: String,
    pub status: String,
    pub duration: String,
    #[serde(skip)]
    pub created_time: i64,
}

/// Renderer-ready payload for one report run. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub entity_name: String,
    pub entity_type: String,
    pub period: String,
    pub generated_date: String,

    pub site_count: usize,
    pub device_count: usize,
    pub online_count: usize,
    pub offline_count: usize,
    pub fault_count: usize,
    pub energy_kwh: f64,
    pub co2_kg: f64,

    pub energy_trend: TrendSeries,
    pub co2_trend: TrendSeries,
    pub dim_trend: Option<TrendSeries>,

    pub daily_avg_kwh: f64,
    pub peak_kwh: f64,
    pub daily_avg_co2: f64,
    pub peak_co2: f64,
    pub interval_label: String,

    pub devices: Vec<DeviceRow>,
    pub faults: Vec<FaultRow>,
    pub alarm_count: usize,

    #[serde(skip)]
    pub charts: BTreeMap<String, ChartImage>,
}
