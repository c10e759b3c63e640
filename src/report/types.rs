//! Report configuration and response envelopes

use crate::aggregation::types::{
    CategoryData, ComparisonData, MetricConfig, MetricData, ReportFilters, TimeSeriesPoint, Trend,
};
use crate::datasource::DateRange;
use crate::error::ErrorDetail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied description of a custom report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomReport {
    pub name: String,

    /// Record kind requested from the data source
    pub data_source: String,

    pub date_range: DateRange,

    #[serde(default)]
    pub filters: ReportFilters,

    /// Grouping field for the category breakdown
    pub group_by: Option<String>,

    /// Value field reduced in time series and categories
    #[serde(default = "default_value_field")]
    pub value_field: String,

    #[serde(default)]
    pub metrics: Vec<MetricConfig>,

    /// Template transform id; unknown ids pass through
    pub template: Option<String>,

    /// Chart hint forwarded to exporters
    pub chart_type: Option<String>,
}

fn default_value_field() -> String {
    "amount".to_string()
}

/// Response envelope shared by all report operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse<T> {
    pub data: T,
    pub metadata: ReportMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub total_records: usize,
    pub page: usize,
    pub page_size: usize,
    pub execution_time_ms: u64,
    pub generated_at: DateTime<Utc>,
}

/// Shaped output of `generate_report`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsData {
    pub summary: AnalyticsSummary,
    pub metrics: Vec<MetricData>,
    pub time_series: Vec<TimeSeriesPoint>,
    pub categories: Vec<CategoryData>,
    pub comparison: ComparisonData,
    /// Per-group and per-metric degradation warnings
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_records: usize,
    pub date_range: DateRange,
    pub last_updated: DateTime<Utc>,
}

/// Income/expense totals for a period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialData {
    pub total_donations: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub donations_count: usize,
    pub expenses_count: usize,
}

/// Donation analytics with segmentation and trend series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationAnalytics {
    pub total_amount: f64,
    pub total_count: usize,
    pub average_amount: f64,
    pub recurring_count: usize,
    pub donor_types: Vec<DonorTypeData>,
    pub by_amount_range: Vec<AmountRangeData>,
    pub by_frequency: Vec<FrequencyData>,
    pub monthly_donations: Vec<TimeSeriesPoint>,
    /// Current month vs previous month percentage growth
    pub growth_rate: f64,
    pub trend_direction: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonorTypeData {
    pub donor_type: String,
    pub count: usize,
    pub total: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmountRangeData {
    pub range: String,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrequencyData {
    pub frequency: String,
    pub count: usize,
    pub total: f64,
}

/// Beneficiary impact breakdowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactData {
    pub total_beneficiaries: usize,
    pub by_location: Vec<LocationData>,
    pub by_gender: Vec<GenderData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationData {
    pub city: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenderData {
    pub gender: String,
    pub count: usize,
}
