//! Chart and document rendering.

pub mod charts;
pub mod document;
pub mod layout;

pub use charts::{generate_all_charts, ChartImage, ChartKind, RenderedChart};
pub use document::DocumentRenderer;
