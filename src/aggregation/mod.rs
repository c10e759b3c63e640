//! Aggregation engine: pure grouping, reduction, filtering, sampling and
//! outlier detection over record sets

pub mod engine;
pub mod strategy;
pub mod types;

pub use engine::AggregationEngine;
pub use strategy::{AggregationStrategy, StrategyCatalog};
pub use types::{
    Aggregated, CategoryData, ComparisonData, MetricConfig, MetricData, MetricFormat,
    MetricsOutcome, OutlierReport, OutlierStatistics, ReportFilters, TimeSeriesPoint, Trend,
    ValidationReport,
};
