//! Report orchestration: cache check, fetch, aggregate, shape, store

use crate::aggregation::engine::AggregationEngine;
use crate::aggregation::strategy::StrategyCatalog;
use crate::aggregation::types::Trend;
use crate::config::EngineConfig;
use crate::datasource::{DataSource, DateRange};
use crate::error::Result;
use crate::export::pipeline::ExportPipeline;
use crate::export::progress::CancelToken;
use crate::export::types::{ExportConfig, ExportFormat, ExportResult};
use crate::record::Record;
use crate::report::cache::ReportCache;
use crate::report::templates::TemplateRegistry;
use crate::report::types::{
    AmountRangeData, AnalyticsData, AnalyticsSummary, CustomReport, DonationAnalytics,
    DonorTypeData, FinancialData, FrequencyData, GenderData, ImpactData, LocationData,
    ReportMetadata, ReportResponse,
};
use sha2::{Digest, Sha256};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Donation amount buckets for segmentation
const AMOUNT_RANGES: [(f64, f64, &str); 5] = [
    (0.0, 100.0, "0-100"),
    (100.0, 500.0, "100-500"),
    (500.0, 1000.0, "500-1000"),
    (1000.0, 5000.0, "1000-5000"),
    (5000.0, f64::INFINITY, "5000+"),
];

/// Orchestrates report generation over an injected data source, with a
/// TTL + capacity-bounded response cache. Callers only ever receive clones
/// of cached payloads.
pub struct ReportBuilder {
    source: Arc<dyn DataSource>,
    cache: ReportCache,
    templates: Arc<TemplateRegistry>,
    engine: AggregationEngine,
    config: EngineConfig,
}

impl ReportBuilder {
    pub fn new(source: Arc<dyn DataSource>, config: EngineConfig) -> Self {
        let catalog = Arc::new(StrategyCatalog::standard());
        let cache = ReportCache::new(
            Duration::from_secs(config.reporting.cache_ttl_secs),
            config.reporting.cache_capacity,
        );
        Self {
            cache,
            templates: crate::report::templates::standard_registry(),
            engine: AggregationEngine::new(catalog, config.processing.clone()),
            source,
            config,
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateRegistry>) -> Self {
        self.templates = templates;
        self
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Generate a custom report. Cached by the canonical hash of the
    /// configuration; a hit skips the data source entirely.
    pub async fn generate_report(&self, report: &CustomReport) -> Result<ReportResponse<Value>> {
        let started = Instant::now();
        let cache_key = cache_key("generate_report", report)?;

        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(key = %cache_key, "report cache hit");
            return Ok(serde_json::from_value(cached)?);
        }

        let records = self
            .source
            .fetch(&report.data_source, report.date_range)
            .await?;
        let filtered = self.engine.apply_filters(&records, &report.filters);

        let mut warnings = Vec::new();
        let outcome = self.engine.metrics(&filtered, &report.metrics);
        warnings.extend(outcome.warnings);

        let time_series =
            self.engine
                .time_series(&filtered, "created_at", &report.value_field, None);

        let categories = match &report.group_by {
            Some(group_by) => {
                let result = self
                    .engine
                    .category_data(&filtered, group_by, &report.value_field)?;
                result
            }
            None => Vec::new(),
        };

        // Period-over-period comparison from a date-midpoint split of the
        // single fetch
        let midpoint = report.date_range.midpoint();
        let (previous, current): (Vec<Record>, Vec<Record>) = filtered
            .iter()
            .cloned()
            .partition(|r| r.timestamp().map(|ts| ts < midpoint).unwrap_or(false));
        let comparison = self.engine.comparison(&current, &previous, &report.value_field);

        let data = AnalyticsData {
            summary: AnalyticsSummary {
                total_records: filtered.len(),
                date_range: report.date_range,
                last_updated: chrono::Utc::now(),
            },
            metrics: outcome.metrics,
            time_series,
            categories,
            comparison,
            warnings,
        };

        let payload = self
            .templates
            .apply(report.template.as_deref(), serde_json::to_value(&data)?);

        let response = ReportResponse {
            data: payload,
            metadata: self.metadata(filtered.len(), started),
            error: None,
        };

        self.cache
            .insert(cache_key, serde_json::to_value(&response)?);
        info!(report = %report.name, records = filtered.len(), "report generated");
        Ok(response)
    }

    /// Income/expense totals over the `donations` and `expenses` kinds
    pub async fn generate_financial_report(
        &self,
        range: DateRange,
        filters: &crate::aggregation::types::ReportFilters,
    ) -> Result<ReportResponse<FinancialData>> {
        let started = Instant::now();
        let cache_key = cache_key("generate_financial_report", &(range, filters))?;
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(serde_json::from_value(cached)?);
        }

        let donations = self.fetch_filtered("donations", range, filters).await?;
        let expenses = self.fetch_filtered("expenses", range, filters).await?;

        let total_donations: f64 = donations.iter().filter_map(|r| r.number("amount")).sum();
        let total_expenses: f64 = expenses.iter().filter_map(|r| r.number("amount")).sum();

        let data = FinancialData {
            total_donations,
            total_expenses,
            net_income: total_donations - total_expenses,
            donations_count: donations.len(),
            expenses_count: expenses.len(),
        };

        let response = ReportResponse {
            data,
            metadata: self.metadata(donations.len() + expenses.len(), started),
            error: None,
        };
        self.cache
            .insert(cache_key, serde_json::to_value(&response)?);
        Ok(response)
    }

    /// Donation segmentation, monthly trend series and growth rate
    pub async fn generate_donation_analytics(
        &self,
        range: DateRange,
        filters: &crate::aggregation::types::ReportFilters,
    ) -> Result<ReportResponse<DonationAnalytics>> {
        let started = Instant::now();
        let cache_key = cache_key("generate_donation_analytics", &(range, filters))?;
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(serde_json::from_value(cached)?);
        }

        let donations = self.fetch_filtered("donations", range, filters).await?;

        let total_amount: f64 = donations.iter().filter_map(|r| r.number("amount")).sum();
        let total_count = donations.len();
        let recurring: Vec<&Record> = donations
            .iter()
            .filter(|r| r.boolean("is_recurring").unwrap_or(false))
            .collect();
        let one_time_count = total_count - recurring.len();

        // Donor type segmentation
        let mut by_type: BTreeMap<String, (usize, f64)> = BTreeMap::new();
        for donation in &donations {
            let donor_type = donation
                .group_key("donor_type")
                .unwrap_or_else(|| "unknown".to_string());
            let entry = by_type.entry(donor_type).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += donation.number("amount").unwrap_or(0.0);
        }
        let donor_types = by_type
            .into_iter()
            .map(|(donor_type, (count, total))| DonorTypeData {
                donor_type,
                count,
                total,
                average: if count > 0 { total / count as f64 } else { 0.0 },
            })
            .collect();

        let by_amount_range = AMOUNT_RANGES
            .iter()
            .map(|(min, max, label)| {
                let in_range: Vec<f64> = donations
                    .iter()
                    .filter_map(|r| r.number("amount"))
                    .filter(|a| a >= min && a < max)
                    .collect();
                AmountRangeData {
                    range: (*label).to_string(),
                    count: in_range.len(),
                    total: in_range.iter().sum(),
                }
            })
            .collect();

        let recurring_total: f64 = recurring.iter().filter_map(|r| r.number("amount")).sum();
        let by_frequency = vec![
            FrequencyData {
                frequency: "one-time".to_string(),
                count: one_time_count,
                total: total_amount - recurring_total,
            },
            FrequencyData {
                frequency: "recurring".to_string(),
                count: recurring.len(),
                total: recurring_total,
            },
        ];

        let monthly_donations = monthly_series(&donations, "amount");
        let (growth_rate, trend_direction) = month_over_month(&monthly_donations, "amount");

        let data = DonationAnalytics {
            total_amount,
            total_count,
            average_amount: if total_count > 0 {
                total_amount / total_count as f64
            } else {
                0.0
            },
            recurring_count: recurring.len(),
            donor_types,
            by_amount_range,
            by_frequency,
            monthly_donations,
            growth_rate,
            trend_direction,
        };

        let response = ReportResponse {
            data,
            metadata: self.metadata(total_count, started),
            error: None,
        };
        self.cache
            .insert(cache_key, serde_json::to_value(&response)?);
        Ok(response)
    }

    /// Beneficiary impact report: location and gender breakdowns
    pub async fn generate_impact_report(
        &self,
        range: DateRange,
        filters: &crate::aggregation::types::ReportFilters,
    ) -> Result<ReportResponse<ImpactData>> {
        let started = Instant::now();
        let cache_key = cache_key("generate_impact_report", &(range, filters))?;
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(serde_json::from_value(cached)?);
        }

        let beneficiaries = self.fetch_filtered("beneficiaries", range, filters).await?;
        let total = beneficiaries.len();

        let mut cities: BTreeMap<String, usize> = BTreeMap::new();
        let mut genders: BTreeMap<String, usize> = BTreeMap::new();
        for beneficiary in &beneficiaries {
            let city = beneficiary
                .group_key("city")
                .unwrap_or_else(|| "Unknown".to_string());
            *cities.entry(city).or_insert(0) += 1;
            let gender = beneficiary
                .group_key("gender")
                .unwrap_or_else(|| "Unknown".to_string());
            *genders.entry(gender).or_insert(0) += 1;
        }

        let data = ImpactData {
            total_beneficiaries: total,
            by_location: cities
                .into_iter()
                .map(|(city, count)| LocationData {
                    city,
                    count,
                    percentage: if total > 0 {
                        count as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                })
                .collect(),
            by_gender: genders
                .into_iter()
                .map(|(gender, count)| GenderData { gender, count })
                .collect(),
        };

        let response = ReportResponse {
            data,
            metadata: self.metadata(total, started),
            error: None,
        };
        self.cache
            .insert(cache_key, serde_json::to_value(&response)?);
        Ok(response)
    }

    /// Generate a report and funnel it straight into the export pipeline.
    /// Generation failures are folded into a failure `ExportResult` so the
    /// caller gets one well-formed outcome either way.
    pub async fn export_report(
        &self,
        report: &CustomReport,
        pipeline: &ExportPipeline,
        format: ExportFormat,
        filename: Option<String>,
    ) -> Result<ExportResult> {
        let generated = match self.generate_report(report).await {
            Ok(response) => response,
            Err(err) => {
                return Ok(ExportResult::failure(
                    format,
                    err.detail(serde_json::json!({"report": report.name})),
                ));
            }
        };

        let config = ExportConfig {
            format,
            filename,
            ..ExportConfig::default()
        };
        pipeline
            .export(generated.data, &config, None, &CancelToken::new())
            .await
    }

    fn metadata(&self, total_records: usize, started: Instant) -> ReportMetadata {
        ReportMetadata {
            total_records,
            page: 1,
            page_size: self.config.reporting.default_page_size,
            execution_time_ms: started.elapsed().as_millis() as u64,
            generated_at: chrono::Utc::now(),
        }
    }

    async fn fetch_filtered(
        &self,
        kind: &str,
        range: DateRange,
        filters: &crate::aggregation::types::ReportFilters,
    ) -> Result<Vec<Record>> {
        let records = self.source.fetch(kind, range).await?;
        Ok(self.engine.apply_filters(&records, filters))
    }
}

/// SHA-256 cache key over the method name and canonicalized parameters.
/// Object keys are sorted recursively so logically equal configurations
/// hash identically regardless of field ordering.
fn cache_key<P: Serialize>(method: &str, params: &P) -> Result<String> {
    let value = serde_json::to_value(params)?;
    let canonical = canonicalize(&value);
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.to_string().as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Sum `value_field` per YYYY-MM bucket, ascending
fn monthly_series(
    records: &[Record],
    value_field: &str,
) -> Vec<crate::aggregation::types::TimeSeriesPoint> {
    let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        let Some(ts) = record.timestamp() else { continue };
        let month = ts.format("%Y-%m").to_string();
        *by_month.entry(month).or_insert(0.0) += record.number(value_field).unwrap_or(0.0);
    }
    by_month
        .into_iter()
        .map(|(date, total)| crate::aggregation::types::TimeSeriesPoint {
            date,
            values: [(value_field.to_string(), total)].into_iter().collect(),
        })
        .collect()
}

/// Growth rate and direction from the last two monthly buckets
fn month_over_month(
    series: &[crate::aggregation::types::TimeSeriesPoint],
    value_field: &str,
) -> (f64, Trend) {
    if series.len() < 2 {
        return (0.0, Trend::Stable);
    }
    let latest = series[series.len() - 1]
        .values
        .get(value_field)
        .copied()
        .unwrap_or(0.0);
    let prior = series[series.len() - 2]
        .values
        .get(value_field)
        .copied()
        .unwrap_or(0.0);
    if prior == 0.0 {
        return (0.0, Trend::Stable);
    }
    let growth = (latest - prior) / prior * 100.0;
    let trend = if growth > 0.1 {
        Trend::Up
    } else if growth < -0.1 {
        Trend::Down
    } else {
        Trend::Stable
    };
    (growth, trend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_is_order_insensitive() {
        let a = cache_key("m", &json!({"x": 1, "y": {"b": 2, "a": 3}})).unwrap();
        let b = cache_key("m", &json!({"y": {"a": 3, "b": 2}, "x": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_separates_methods() {
        let a = cache_key("method_a", &json!({"x": 1})).unwrap();
        let b = cache_key("method_b", &json!({"x": 1})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_monthly_series_and_growth() {
        let records = vec![
            Record::from_pairs(&[("created_at", json!("2024-01-10")), ("amount", json!(100.0))]),
            Record::from_pairs(&[("created_at", json!("2024-02-10")), ("amount", json!(150.0))]),
            Record::from_pairs(&[("created_at", json!("2024-02-20")), ("amount", json!(50.0))]),
        ];
        let series = monthly_series(&records, "amount");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, "2024-01");
        assert_eq!(series[1].values.get("amount"), Some(&200.0));

        let (growth, trend) = month_over_month(&series, "amount");
        assert!((growth - 100.0).abs() < 1e-9);
        assert_eq!(trend, Trend::Up);
    }
}
