//! Report assembly: period arithmetic, trend reduction and the generation
//! pipeline that ties the platform, renderers, store and mailer together.

pub mod assembler;
pub mod period;
pub mod trend;

pub use assembler::ReportService;
