use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::AppState;
use crate::error::ApiError;
use crate::models::{ReportHistory, ReportRequest, ReportResult};

// ---

const MAX_HISTORY_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/report/generate", post(generate))
        .route("/api/report/history/{entity_id}", get(history))
        .route("/api/report/download/{report_id}", get(download))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportResult>, ApiError> {
    // ---
    let Json(request) = payload?;
    info!(
        entity_id = %request.entity_id,
        entity_type = %request.entity_type,
        "POST /api/report/generate"
    );

    let result = state.reports.generate(&request).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    10
}

async fn history(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ReportHistory>, ApiError> {
    // ---
    let Query(HistoryQuery { limit, offset }) = query?;
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }
    if offset < 0 {
        return Err(ApiError::Validation("offset must not be negative".into()));
    }
    debug!(entity_id = %entity_id, limit, offset, "GET /api/report/history");

    let (reports, total) = state.reports.store().history(&entity_id, limit, offset).await?;
    Ok(Json(ReportHistory {
        reports,
        total,
        limit,
        offset,
    }))
}

/// Strip path separators and parent references from a caller-supplied id.
fn sanitize_report_id(raw: &str) -> String {
    raw.replace("..", "").replace(['/', '\\'], "")
}

async fn download(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // ---
    let report_id = sanitize_report_id(&report_id);
    if report_id.is_empty() {
        return Err(ApiError::NotFound("Report not found".into()));
    }

    let path = state.storage_root.join(format!("{report_id}.pdf"));
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("Report '{report_id}' not found")));
        }
        Err(e) => return Err(ApiError::Internal(format!("read {}: {e}", path.display()))),
    };
    debug!(report_id = %report_id, bytes = bytes.len(), "GET /api/report/download");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{report_id}.pdf\""),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_report_id_sanitizing() {
        // ---
        assert_eq!(sanitize_report_id("rpt-123"), "rpt-123");
        assert_eq!(sanitize_report_id("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_report_id("..\\secret"), "secret");
        assert_eq!(sanitize_report_id("...."), "");
    }

    #[test]
    fn test_history_query_defaults() {
        // ---
        let q: HistoryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!((q.limit, q.offset), (10, 0));
    }
}
