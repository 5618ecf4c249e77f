use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::AppState;
use crate::error::ApiError;
use crate::models::{ScheduleRequest, ScheduleResponse};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/report/schedule", post(upsert))
        .route("/api/report/schedule/{schedule_id}", get(fetch).delete(remove))
        .route("/api/report/schedules", get(list))
}

/// Create or replace the schedule for an entity.
async fn upsert(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    // ---
    let Json(request) = payload?;
    info!(
        entity_id = %request.entity_id,
        frequency = %request.frequency,
        "POST /api/report/schedule"
    );
    Ok(Json(state.scheduler.add(&request).await?))
}

async fn fetch(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    Ok(Json(state.scheduler.get(&schedule_id).await?))
}

async fn remove(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    // ---
    info!(job_id = %schedule_id, "DELETE /api/report/schedule");
    Ok(Json(state.scheduler.remove(&schedule_id).await?))
}

async fn list(State(state): State<AppState>) -> Json<Vec<ScheduleResponse>> {
    Json(state.scheduler.list().await)
}
