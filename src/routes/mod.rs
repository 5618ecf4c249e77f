//! HTTP routes gateway (EMBP).
//!
//! Each sibling module exposes a subrouter; this module merges them and
//! attaches the shared [`AppState`]. `main.rs` and the integration tests only
//! ever call [`router`].

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::Router;

use crate::error::ApiError;
use crate::report::ReportService;
use crate::scheduler::Scheduler;

mod health;
mod reports;
mod schedules;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub scheduler: Arc<Scheduler>,
    /// Directory holding `{report_id}.pdf` files.
    pub storage_root: PathBuf,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(reports::router())
        .merge(schedules::router())
        .merge(health::router())
        .with_state(state)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
