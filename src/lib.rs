//! Fleet reporting service library.
//!
//! Everything except process startup lives here so the integration tests can
//! build the same router `main.rs` serves.

pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod platform;
pub mod render;
pub mod report;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ReportError};
