//! Telemetry platform boundary.
//!
//! The reporting pipeline only talks to the platform through the [`Platform`]
//! trait. [`PlatformClient`] is the REST implementation; tests substitute
//! in-memory fakes. [`hierarchy::resolve`] builds the site/device tree on top
//! of it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ReportError, Result};
use crate::models::{PlatformEntityType, TrendSeries};

mod client;
pub mod hierarchy;

pub use client::{PlatformClient, PlatformSettings};

// ---

/// Name and `type` tag of an asset, device or customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub id: String,
    pub name: String,
    /// Asset/device profile type ("estate", "site", ...). Empty for customers.
    pub kind: String,
}

/// Target of a "Contains" relation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub id: String,
    pub entity_type: String,
}

impl EntityRef {
    pub fn is(&self, entity_type: PlatformEntityType) -> bool {
        self.entity_type.eq_ignore_ascii_case(entity_type.as_str())
    }
}

/// Alarm as returned by the alarm history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmRecord {
    pub created_time: i64,
    pub end_ts: Option<i64>,
    pub clear_ts: Option<i64>,
    #[serde(rename = "type")]
    pub alarm_type: Option<String>,
    pub severity: Option<String>,
    pub status: String,
    pub originator_name: Option<String>,
}

impl AlarmRecord {
    /// An alarm counts as an active fault while its status carries the `ACTIVE` prefix.
    pub fn is_active(&self) -> bool {
        self.status.starts_with("ACTIVE")
    }

    /// Clear time, when the platform reported one.
    pub fn cleared_at(&self) -> Option<i64> {
        self.end_ts
            .filter(|ts| *ts > 0)
            .or(self.clear_ts.filter(|ts| *ts > 0))
    }
}

/// Read surface of the telemetry platform used by the reporting pipeline.
#[async_trait]
pub trait Platform: Send + Sync {
    // ---
    async fn get_entity(&self, id: &str, entity_type: PlatformEntityType) -> Result<EntityInfo>;

    /// Outgoing "Contains" relations of an entity.
    async fn get_relations(
        &self,
        from_id: &str,
        from_type: PlatformEntityType,
    ) -> Result<Vec<EntityRef>>;

    /// All assets assigned to a customer, across every page.
    async fn get_customer_assets(&self, customer_id: &str) -> Result<Vec<EntityInfo>>;

    /// SUM of one key over the whole `[start_ts, end_ts]` window.
    async fn get_telemetry_sum(
        &self,
        device_id: &str,
        key: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<f64>;

    /// Bucketed SUM per key, each series ordered by timestamp.
    async fn get_telemetry_trend(
        &self,
        device_id: &str,
        keys: &[&str],
        start_ts: i64,
        end_ts: i64,
        interval_ms: i64,
    ) -> Result<HashMap<String, TrendSeries>>;

    async fn get_attributes(
        &self,
        entity_id: &str,
        entity_type: PlatformEntityType,
        scope: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, serde_json::Value>>;

    async fn get_alarm_history(
        &self,
        entity_id: &str,
        entity_type: PlatformEntityType,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<AlarmRecord>>;

    /// Trend for a key a device may not report at all.
    ///
    /// Only "the key is absent" (missing or empty series, or a 404) maps to
    /// `None`; any other failure is returned.
    async fn get_optional_trend(
        &self,
        device_id: &str,
        key: &str,
        start_ts: i64,
        end_ts: i64,
        interval_ms: i64,
    ) -> Result<Option<TrendSeries>> {
        // ---
        match self
            .get_telemetry_trend(device_id, &[key], start_ts, end_ts, interval_ms)
            .await
        {
            Ok(mut trends) => Ok(trends.remove(key).filter(|series| !series.is_empty())),
            Err(ReportError::Platform { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Telemetry values arrive either as JSON numbers or as numeric strings.
pub fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    // ---
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_value() {
        // ---
        assert_eq!(numeric_value(&json!(12.5)), Some(12.5));
        assert_eq!(numeric_value(&json!("123.45")), Some(123.45));
        assert_eq!(numeric_value(&json!("n/a")), None);
        assert_eq!(numeric_value(&json!(null)), None);
    }

    #[test]
    fn test_alarm_status_and_clear_time() {
        // ---
        let alarm: AlarmRecord = serde_json::from_value(json!({
            "createdTime": 1000,
            "endTs": 0,
            "clearTs": 5000,
            "type": "Lamp failure",
            "status": "CLEARED_ACK"
        }))
        .unwrap();

        assert!(!alarm.is_active());
        assert_eq!(alarm.cleared_at(), Some(5000));
        assert_eq!(alarm.alarm_type.as_deref(), Some("Lamp failure"));

        let active = AlarmRecord {
            status: "ACTIVE_UNACK".into(),
            ..Default::default()
        };
        assert!(active.is_active());
        assert_eq!(active.cleared_at(), None);
    }
}
