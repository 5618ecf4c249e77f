//! REST client for the telemetry platform.
//!
//! Authenticates lazily with username/password, sends the JWT as
//! `X-Authorization: Bearer <token>`, and re-authenticates once when a call
//! comes back 401.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{numeric_value, AlarmRecord, EntityInfo, EntityRef, Platform};
use crate::error::{ReportError, Result};
use crate::models::{PlatformEntityType, TrendPoint, TrendSeries};
use crate::Config;

// ---

/// Connection settings for [`PlatformClient`].
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub max_pages: u32,
}

impl PlatformSettings {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        PlatformSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: Duration::from_secs(30),
            page_size: 100,
            max_pages: 100,
        }
    }
}

impl From<&Config> for PlatformSettings {
    fn from(cfg: &Config) -> Self {
        PlatformSettings {
            timeout: cfg.tb_timeout(),
            page_size: cfg.tb_page_size,
            max_pages: cfg.api_max_pages,
            ..PlatformSettings::new(&cfg.tb_url, &cfg.tb_username, &cfg.tb_password)
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct RawId {
    id: String,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl RawEntity {
    // ---
    fn into_info(self, fallback_id: &str, entity_type: PlatformEntityType) -> EntityInfo {
        // customers carry their display name in `title`
        let name = match entity_type {
            PlatformEntityType::Customer => self.title.or(self.name),
            _ => self.name.or(self.title),
        };
        EntityInfo {
            id: self.id.map(|id| id.id).unwrap_or_else(|| fallback_id.to_string()),
            name: name.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawRelation {
    to: EntityRef,
}

#[derive(Deserialize)]
struct RawAttribute {
    key: String,
    value: Value,
}

/// Thin typed wrapper around the platform REST API.
pub struct PlatformClient {
    http: reqwest::Client,
    settings: PlatformSettings,
    token: Mutex<Option<String>>,
}

fn transport_error(err: reqwest::Error) -> ReportError {
    ReportError::Connectivity(err.to_string())
}

impl PlatformClient {
    // ---
    pub fn new(settings: PlatformSettings) -> Result<Self> {
        // ---
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ReportError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(PlatformClient {
            http,
            settings,
            token: Mutex::new(None),
        })
    }

    /// Log in and replace the cached token.
    pub async fn authenticate(&self) -> Result<String> {
        // ---
        let mut guard = self.token.lock().await;
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn login(&self) -> Result<String> {
        // ---
        let url = format!("{}/api/auth/login", self.settings.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "username": self.settings.username,
                "password": self.settings.password,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Platform {
                status: status.as_u16(),
                message: format!("authentication failed: {body}"),
            });
        }

        let login: LoginResponse = response.json().await.map_err(|e| ReportError::Platform {
            status: status.as_u16(),
            message: format!("invalid login response: {e}"),
        })?;

        debug!(user = %self.settings.username, "Authenticated against platform");
        Ok(login.token)
    }

    async fn current_token(&self) -> Result<String> {
        // ---
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Re-login after a 401, unless another task already replaced `stale`.
    async fn refresh_token(&self, stale: &str) -> Result<String> {
        // ---
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token != stale {
                return Ok(token.clone());
            }
        }
        info!("JWT expired, re-authenticating");
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn send_get(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<reqwest::Response> {
        // ---
        let url = format!("{}{}", self.settings.base_url, path);
        self.http
            .get(&url)
            .query(query)
            .header("X-Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(transport_error)
    }

    /// GET a JSON document, retrying once with a fresh token on 401.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        // ---
        let token = self.current_token().await?;
        let mut response = self.send_get(path, query, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token(&token).await?;
            response = self.send_get(path, query, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, path, "Platform request failed");
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(ReportError::Platform {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| ReportError::Platform {
            status: status.as_u16(),
            message: format!("invalid JSON from {path}: {e}"),
        })
    }

    /// Collect the `data` arrays of a `{data, hasNext}` paginated endpoint.
    async fn get_paged(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        // ---
        let mut items = Vec::new();
        let mut page: u32 = 0;

        loop {
            if page >= self.settings.max_pages {
                warn!(
                    path,
                    "Hit page limit of {}, stopping pagination. Fetched {} records so far.",
                    self.settings.max_pages,
                    items.len()
                );
                break;
            }

            let mut params = query.to_vec();
            params.push(("pageSize", self.settings.page_size.to_string()));
            params.push(("page", page.to_string()));

            let body = self.get_json(path, &params).await?;
            if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
                items.extend(data.iter().cloned());
            } else {
                debug!(path, page, "Page response missing 'data' array");
            }

            page += 1;
            let has_next = body.get("hasNext").and_then(|v| v.as_bool()).unwrap_or(false);
            if !has_next {
                break;
            }
        }

        debug!(path, pages = page, records = items.len(), "Finished paginated fetch");
        Ok(items)
    }
}

fn parse_series(points: &Value) -> TrendSeries {
    // ---
    let mut series: TrendSeries = points
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|p| {
                    let ts = p.get("ts").and_then(|t| t.as_i64())?;
                    let value = p.get("value").and_then(numeric_value)?;
                    Some(TrendPoint { ts, value })
                })
                .collect()
        })
        .unwrap_or_default();
    series.sort_by_key(|p| p.ts);
    series
}

#[async_trait]
impl Platform for PlatformClient {
    // ---
    async fn get_entity(&self, id: &str, entity_type: PlatformEntityType) -> Result<EntityInfo> {
        // ---
        let path = match entity_type {
            PlatformEntityType::Asset => format!("/api/asset/{id}"),
            PlatformEntityType::Device => format!("/api/device/{id}"),
            PlatformEntityType::Customer => format!("/api/customer/{id}"),
        };
        let body = self.get_json(&path, &[]).await?;
        let raw: RawEntity = serde_json::from_value(body).map_err(|e| ReportError::Platform {
            status: 200,
            message: format!("unexpected entity payload for {id}: {e}"),
        })?;
        Ok(raw.into_info(id, entity_type))
    }

    async fn get_relations(
        &self,
        from_id: &str,
        from_type: PlatformEntityType,
    ) -> Result<Vec<EntityRef>> {
        // ---
        let query = [
            ("fromId", from_id.to_string()),
            ("fromType", from_type.as_str().to_string()),
            ("relationType", "Contains".to_string()),
            ("relationTypeGroup", "COMMON".to_string()),
        ];
        let body = self.get_json("/api/relations", &query).await?;
        let relations: Vec<RawRelation> =
            serde_json::from_value(body).map_err(|e| ReportError::Platform {
                status: 200,
                message: format!("unexpected relations payload for {from_id}: {e}"),
            })?;
        Ok(relations.into_iter().map(|r| r.to).collect())
    }

    async fn get_customer_assets(&self, customer_id: &str) -> Result<Vec<EntityInfo>> {
        // ---
        let path = format!("/api/customer/{customer_id}/assets");
        let items = self.get_paged(&path, &[]).await?;

        let mut assets = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<RawEntity>(item) {
                Ok(raw) if raw.id.is_some() => {
                    assets.push(raw.into_info("", PlatformEntityType::Asset));
                }
                Ok(_) => debug!(customer_id, "Skipping customer asset {} without id", i),
                Err(e) => debug!(customer_id, "Failed to parse customer asset {}: {}", i, e),
            }
        }
        Ok(assets)
    }

    async fn get_telemetry_sum(
        &self,
        device_id: &str,
        key: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<f64> {
        // ---
        let path = format!("/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries");
        let query = [
            ("keys", key.to_string()),
            ("startTs", start_ts.to_string()),
            ("endTs", end_ts.to_string()),
            ("agg", "SUM".to_string()),
            ("interval", (end_ts - start_ts).max(1).to_string()),
        ];
        let body = self.get_json(&path, &query).await?;

        // {"energy_wh": [{"ts": ..., "value": "123.45"}]}
        let total = body
            .get(key)
            .and_then(|v| v.as_array())
            .and_then(|points| points.first())
            .and_then(|p| p.get("value"))
            .and_then(numeric_value)
            .unwrap_or(0.0);
        Ok(total)
    }

    async fn get_telemetry_trend(
        &self,
        device_id: &str,
        keys: &[&str],
        start_ts: i64,
        end_ts: i64,
        interval_ms: i64,
    ) -> Result<HashMap<String, TrendSeries>> {
        // ---
        let path = format!("/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries");
        let query = [
            ("keys", keys.join(",")),
            ("startTs", start_ts.to_string()),
            ("endTs", end_ts.to_string()),
            ("agg", "SUM".to_string()),
            ("interval", interval_ms.to_string()),
        ];
        let body = self.get_json(&path, &query).await?;

        let trends = keys
            .iter()
            .filter_map(|key| body.get(*key).map(|points| (key.to_string(), parse_series(points))))
            .collect();
        Ok(trends)
    }

    async fn get_attributes(
        &self,
        entity_id: &str,
        entity_type: PlatformEntityType,
        scope: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, Value>> {
        // ---
        let path = format!(
            "/api/plugins/telemetry/{}/{}/values/attributes/{}",
            entity_type.as_str(),
            entity_id,
            scope
        );
        let query: Vec<(&str, String)> = if keys.is_empty() {
            Vec::new()
        } else {
            vec![("keys", keys.join(","))]
        };
        let body = self.get_json(&path, &query).await?;

        // [{"key": "lastActivityTime", "value": 1700000000000, "lastUpdateTs": ...}]
        let attrs: Vec<RawAttribute> =
            serde_json::from_value(body).map_err(|e| ReportError::Platform {
                status: 200,
                message: format!("unexpected attributes payload for {entity_id}: {e}"),
            })?;
        Ok(attrs.into_iter().map(|a| (a.key, a.value)).collect())
    }

    async fn get_alarm_history(
        &self,
        entity_id: &str,
        entity_type: PlatformEntityType,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<AlarmRecord>> {
        // ---
        let path = format!("/api/alarm/{}/{}", entity_type.as_str(), entity_id);
        let query = [
            ("startTime", start_ts.to_string()),
            ("endTime", end_ts.to_string()),
            ("sortProperty", "createdTime".to_string()),
            ("sortOrder", "DESC".to_string()),
        ];
        let items = self.get_paged(&path, &query).await?;

        let mut alarms = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<AlarmRecord>(item) {
                Ok(alarm) => alarms.push(alarm),
                Err(e) => debug!(entity_id, "Failed to parse alarm record: {}", e),
            }
        }
        Ok(alarms)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> PlatformClient {
        PlatformClient::new(PlatformSettings::new(base_url, "tenant@example.org", "secret")).unwrap()
    }

    async fn mount_login(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": token, "refreshToken": "r"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_lazy_login_and_bearer_header() {
        // ---
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"username": "tenant@example.org", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/asset/a1"))
            .and(header("X-Authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": {"id": "a1", "entityType": "ASSET"},
                "name": "North Estate",
                "type": "Estate"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let first = client.get_entity("a1", PlatformEntityType::Asset).await.unwrap();
        let second = client.get_entity("a1", PlatformEntityType::Asset).await.unwrap();

        assert_eq!(first.name, "North Estate");
        assert_eq!(first.kind, "Estate");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reauthenticates_once_on_401() {
        // ---
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "old"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/customer/c1"))
            .and(header("X-Authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/customer/c1"))
            .and(header("X-Authorization", "Bearer new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": {"id": "c1"}, "title": "Acme Council"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let customer = client
            .get_entity("c1", PlatformEntityType::Customer)
            .await
            .unwrap();

        assert_eq!(customer.name, "Acme Council");
    }

    #[tokio::test]
    async fn test_second_401_is_surfaced() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/device/d1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .get_entity("d1", PlatformEntityType::Device)
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Platform { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_customer_assets_follow_pagination() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/customer/c1/assets"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": {"id": "e1"}, "name": "Estate 1", "type": "estate"}],
                "hasNext": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/customer/c1/assets"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": {"id": "s1"}, "name": "Site 1", "type": "site"},
                    {"name": "no id"}
                ],
                "hasNext": false
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let assets = client.get_customer_assets("c1").await.unwrap();

        let ids: Vec<&str> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "s1"]);
        assert_eq!(assets[1].kind, "site");
    }

    #[tokio::test]
    async fn test_telemetry_sum_parses_string_values() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/d1/values/timeseries"))
            .and(query_param("keys", "energy_wh"))
            .and(query_param("agg", "SUM"))
            .and(query_param("interval", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "energy_wh": [{"ts": 1000, "value": "123.45"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/d1/values/timeseries"))
            .and(query_param("keys", "co2_grams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let energy = client.get_telemetry_sum("d1", "energy_wh", 0, 1000).await.unwrap();
        let co2 = client.get_telemetry_sum("d1", "co2_grams", 0, 1000).await.unwrap();

        assert_eq!(energy, 123.45);
        assert_eq!(co2, 0.0);
    }

    #[tokio::test]
    async fn test_trend_is_sorted_and_skips_bad_values() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/d1/values/timeseries"))
            .and(query_param("keys", "energy_wh,co2_grams"))
            .and(query_param("interval", "86400000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "energy_wh": [
                    {"ts": 200, "value": "2.0"},
                    {"ts": 100, "value": 1.0},
                    {"ts": 300, "value": "oops"}
                ],
                "co2_grams": [{"ts": 100, "value": "5"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let trends = client
            .get_telemetry_trend("d1", &["energy_wh", "co2_grams"], 0, 1000, 86_400_000)
            .await
            .unwrap();

        assert_eq!(
            trends["energy_wh"],
            vec![TrendPoint { ts: 100, value: 1.0 }, TrendPoint { ts: 200, value: 2.0 }]
        );
        assert_eq!(trends["co2_grams"].len(), 1);
    }

    #[tokio::test]
    async fn test_optional_trend_absent_vs_failure() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/missing/values/timeseries"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/empty/values/timeseries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/broken/values/timeseries"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());

        let missing = client.get_optional_trend("missing", "dim_level", 0, 10, 1).await;
        assert!(matches!(missing, Ok(None)));

        let empty = client.get_optional_trend("empty", "dim_level", 0, 10, 1).await;
        assert!(matches!(empty, Ok(None)));

        let broken = client.get_optional_trend("broken", "dim_level", 0, 10, 1).await;
        assert!(matches!(broken, Err(ReportError::Platform { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_attributes_and_alarms() {
        // ---
        let server = MockServer::start().await;
        mount_login(&server, "t").await;

        Mock::given(method("GET"))
            .and(path("/api/plugins/telemetry/DEVICE/d1/values/attributes/SERVER_SCOPE"))
            .and(query_param("keys", "lastActivityTime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"key": "lastActivityTime", "value": 1_700_000_000_000_i64, "lastUpdateTs": 1}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/alarm/DEVICE/d1"))
            .and(query_param("sortOrder", "DESC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "createdTime": 10,
                    "type": "Driver fault",
                    "severity": "CRITICAL",
                    "status": "ACTIVE_UNACK",
                    "originatorName": "Lamp 7"
                }],
                "hasNext": false
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let attrs = client
            .get_attributes(
                "d1",
                PlatformEntityType::Device,
                "SERVER_SCOPE",
                &["lastActivityTime"],
            )
            .await
            .unwrap();
        assert_eq!(attrs["lastActivityTime"], json!(1_700_000_000_000_i64));

        let alarms = client
            .get_alarm_history("d1", PlatformEntityType::Device, 0, 100)
            .await
            .unwrap();
        assert_eq!(alarms.len(), 1);
        assert!(alarms[0].is_active());
        assert_eq!(alarms[0].originator_name.as_deref(), Some("Lamp 7"));
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_connectivity_error() {
        // ---
        let client = test_client("http://127.0.0.1:1");
        let err = client
            .get_entity("a1", PlatformEntityType::Asset)
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Connectivity(_)));
    }
}
