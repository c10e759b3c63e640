//! Reporting and analytics core: aggregation, cached report building and
//! multi-format export.
//!
//! The crate is an in-process API. Callers hand the [`report::ReportBuilder`]
//! a report configuration and a date range, get back structured data, and
//! optionally funnel the result through the [`export::ExportPipeline`] into
//! a downloadable artifact with progress reporting and cancellation.

pub mod aggregation;
pub mod config;
pub mod datasource;
pub mod error;
pub mod export;
pub mod record;
pub mod report;

pub use aggregation::{AggregationEngine, StrategyCatalog};
pub use config::EngineConfig;
pub use datasource::{DataSource, DateRange, MemoryDataSource};
pub use error::{ReportError, Result};
pub use export::{ExportPipeline, ExportSessionManager};
pub use record::Record;
pub use report::ReportBuilder;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging. Respects `RUST_LOG`; defaults to `info`.
pub fn init_logging(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
