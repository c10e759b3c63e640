//! Chart-ready aggregation output shapes

use crate::datasource::DateRange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum_macros::{Display, EnumString};

/// Trend classification from the two-half mean comparison
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Display format hint for a metric value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricFormat {
    Number,
    Currency,
    Percentage,
}

/// Caller-supplied description of one requested metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric key surfaced to the caller
    pub key: String,
    /// Field the strategy reduces over
    pub field: String,
    /// Strategy name: sum | avg | count | min | max
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_format")]
    pub format: MetricFormat,
    pub icon: Option<String>,
    pub color: Option<String>,
}

fn default_strategy() -> String {
    "sum".to_string()
}

fn default_format() -> MetricFormat {
    MetricFormat::Number
}

/// One computed metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricData {
    pub key: String,
    pub value: f64,
    /// Period-over-period percentage delta (second half vs first half)
    pub change: f64,
    pub trend: Trend,
    pub format: MetricFormat,
    pub icon: String,
    pub color: String,
}

impl MetricData {
    /// Degraded entry for a metric whose computation failed
    pub fn error_metric(key: &str, format: MetricFormat) -> Self {
        Self {
            key: key.to_string(),
            value: 0.0,
            change: 0.0,
            trend: Trend::Stable,
            format,
            icon: "alert-circle".to_string(),
            color: "#ef4444".to_string(),
        }
    }
}

/// One point in a daily time series; `values` is keyed by value-field name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesPoint {
    /// ISO day string (YYYY-MM-DD)
    pub date: String,
    pub values: HashMap<String, f64>,
}

/// Category breakdown entry with share of total and a stable color
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryData {
    pub name: String,
    pub value: f64,
    pub percentage: f64,
    pub color: String,
}

/// Period-over-period comparison of two record sets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonData {
    pub current: f64,
    pub previous: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Grouped aggregation output plus the per-group degradation warnings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregated {
    pub groups: BTreeMap<String, f64>,
    pub warnings: Vec<String>,
}

/// Metrics output plus per-metric degradation warnings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsOutcome {
    pub metrics: Vec<MetricData>,
    pub warnings: Vec<String>,
}

/// Outlier detection output: every input record lands in exactly one side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierReport {
    pub outliers: Vec<crate::record::Record>,
    pub cleaned: Vec<crate::record::Record>,
    pub statistics: OutlierStatistics,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct OutlierStatistics {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Per-item validation output; errors are reported by input index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub valid_records: Vec<crate::record::Record>,
}

/// Record filters; an absent field means "no constraint"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilters {
    pub date_range: Option<DateRange>,
    pub categories: Option<Vec<String>>,
    pub statuses: Option<Vec<String>>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub search_term: Option<String>,
}

impl ReportFilters {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.categories.is_none()
            && self.statuses.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
            && self.search_term.is_none()
    }
}

/// Fixed 8-color palette; a category name always maps to the same entry
pub const CATEGORY_PALETTE: [&str; 8] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#06b6d4", "#f97316", "#84cc16",
];

/// Deterministic palette color for a category name
pub fn category_color(name: &str) -> String {
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    CATEGORY_PALETTE[(hash as usize) % CATEGORY_PALETTE.len()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_color_is_stable() {
        assert_eq!(category_color("Education"), category_color("Education"));
        assert!(CATEGORY_PALETTE.contains(&category_color("Health").as_str()));
    }

    #[test]
    fn test_trend_display() {
        assert_eq!(Trend::Up.to_string(), "up");
        assert_eq!("stable".parse::<Trend>().unwrap(), Trend::Stable);
    }

    #[test]
    fn test_error_metric_shape() {
        let metric = MetricData::error_metric("revenue", MetricFormat::Currency);
        assert_eq!(metric.value, 0.0);
        assert_eq!(metric.icon, "alert-circle");
        assert_eq!(metric.trend, Trend::Stable);
    }
}
