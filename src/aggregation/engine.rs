//! Pure aggregation operations over record slices

use crate::aggregation::strategy::StrategyCatalog;
use crate::aggregation::types::{
    category_color, Aggregated, CategoryData, ComparisonData, MetricConfig, MetricData,
    MetricsOutcome, OutlierReport, OutlierStatistics, ReportFilters, TimeSeriesPoint, Trend,
    ValidationReport,
};
use crate::config::ProcessingConfig;
use crate::datasource::DateRange;
use crate::error::{ReportError, Result};
use crate::record::Record;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Group key for records whose group field is missing or null
const UNKNOWN_GROUP: &str = "unknown";

/// Stateless aggregation engine. All operations are pure over their inputs;
/// the strategy catalog is the only shared state and is read-only.
pub struct AggregationEngine {
    catalog: Arc<StrategyCatalog>,
    config: ProcessingConfig,
}

impl AggregationEngine {
    pub fn new(catalog: Arc<StrategyCatalog>, config: ProcessingConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Group records by the stringified value of `group_by` and reduce each
    /// group with the named strategy. Per-group strategy failures degrade
    /// that group to 0 and surface as warnings; structural problems fail.
    pub fn aggregate(
        &self,
        records: &[Record],
        group_by: &str,
        strategy_name: &str,
        value_field: Option<&str>,
    ) -> Result<Aggregated> {
        if group_by.is_empty() {
            return Err(ReportError::Validation(
                "group-by field must not be empty".to_string(),
            ));
        }
        if !records.is_empty() && !records.iter().any(|r| r.get(group_by).is_some()) {
            return Err(ReportError::Validation(format!(
                "no record carries field '{}'",
                group_by
            )));
        }
        let strategy = self.catalog.get(strategy_name).ok_or_else(|| {
            ReportError::Validation(format!("unknown aggregation strategy '{}'", strategy_name))
        })?;

        let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
        for record in records {
            let key = record
                .group_key(group_by)
                .unwrap_or_else(|| UNKNOWN_GROUP.to_string());
            groups.entry(key).or_default().push(record);
        }

        let mut result = Aggregated::default();
        for (key, members) in groups {
            let owned: Vec<Record> = members.into_iter().cloned().collect();
            match strategy.aggregate(&owned, value_field) {
                Ok(value) => {
                    result.groups.insert(key, value);
                }
                Err(err) => {
                    warn!(group = %key, strategy = strategy_name, error = %err, "group aggregation degraded to 0");
                    result
                        .warnings
                        .push(format!("group '{}': {}", key, err));
                    result.groups.insert(key, 0.0);
                }
            }
        }
        Ok(result)
    }

    /// Daily time series: inclusive range filter, sum of `value_field` per
    /// distinct day, ascending by ISO day string, no gap-filling. Records
    /// with unparsable dates are skipped.
    pub fn time_series(
        &self,
        records: &[Record],
        date_field: &str,
        value_field: &str,
        date_range: Option<DateRange>,
    ) -> Vec<TimeSeriesPoint> {
        let mut by_day: BTreeMap<String, f64> = BTreeMap::new();
        for record in records {
            let Some(ts) = record.date(date_field) else {
                warn!(field = date_field, "skipping record with unparsable date");
                continue;
            };
            if let Some(range) = date_range {
                if !range.contains(ts) {
                    continue;
                }
            }
            let day = ts.format("%Y-%m-%d").to_string();
            *by_day.entry(day).or_insert(0.0) += record.number(value_field).unwrap_or(0.0);
        }

        by_day
            .into_iter()
            .map(|(date, total)| TimeSeriesPoint {
                date,
                values: [(value_field.to_string(), total)].into_iter().collect(),
            })
            .collect()
    }

    /// Sum-per-category breakdown with percentage of the grand total and a
    /// deterministic palette color. Percentages are 0 when the total is 0.
    pub fn category_data(
        &self,
        records: &[Record],
        category_field: &str,
        value_field: &str,
    ) -> Result<Vec<CategoryData>> {
        let aggregated = self.aggregate(records, category_field, "sum", Some(value_field))?;
        let total: f64 = aggregated.groups.values().sum();

        Ok(aggregated
            .groups
            .into_iter()
            .map(|(name, value)| CategoryData {
                percentage: if total != 0.0 { value / total * 100.0 } else { 0.0 },
                color: category_color(&name),
                name,
                value,
            })
            .collect())
    }

    /// Absolute and percentage change between two record sets
    pub fn comparison(
        &self,
        current: &[Record],
        previous: &[Record],
        value_field: &str,
    ) -> ComparisonData {
        let sum = |records: &[Record]| -> f64 {
            records.iter().filter_map(|r| r.number(value_field)).sum()
        };
        let current = sum(current);
        let previous = sum(previous);
        let change = current - previous;
        ComparisonData {
            current,
            previous,
            change,
            change_percent: if previous != 0.0 {
                change / previous * 100.0
            } else {
                0.0
            },
        }
    }

    /// Compute one metric per config. A failing metric degrades to an
    /// error-marked zero entry and pushes a warning instead of failing the
    /// whole batch.
    pub fn metrics(&self, records: &[Record], configs: &[MetricConfig]) -> MetricsOutcome {
        let mut outcome = MetricsOutcome::default();
        for config in configs {
            match self.compute_metric(records, config) {
                Ok(metric) => outcome.metrics.push(metric),
                Err(err) => {
                    warn!(metric = %config.key, error = %err, "metric degraded to error entry");
                    outcome
                        .warnings
                        .push(format!("metric '{}': {}", config.key, err));
                    outcome
                        .metrics
                        .push(MetricData::error_metric(&config.key, config.format));
                }
            }
        }
        outcome
    }

    fn compute_metric(&self, records: &[Record], config: &MetricConfig) -> Result<MetricData> {
        let strategy = self.catalog.get(&config.strategy).ok_or_else(|| {
            ReportError::Validation(format!("unknown strategy '{}'", config.strategy))
        })?;
        let value = strategy.aggregate(records, Some(&config.field))?;
        let (trend, change) = self.trend_and_change(records, &config.field);

        Ok(MetricData {
            key: config.key.clone(),
            value,
            change,
            trend,
            format: config.format,
            icon: config.icon.clone().unwrap_or_else(|| "bar-chart".to_string()),
            color: config
                .color
                .clone()
                .unwrap_or_else(|| category_color(&config.key)),
        })
    }

    /// Two-half mean comparison: sort by date ascending, split at the floor
    /// midpoint, classify by the configured percentage threshold. The change
    /// magnitude is the real second-half vs first-half delta.
    fn trend_and_change(&self, records: &[Record], field: &str) -> (Trend, f64) {
        if records.len() < self.config.min_trend_points {
            return (Trend::Stable, 0.0);
        }

        let mut dated: Vec<&Record> = records.iter().collect();
        dated.sort_by_key(|r| r.timestamp());

        let mid = dated.len() / 2;
        let mean = |half: &[&Record]| -> f64 {
            let values: Vec<f64> = half.iter().filter_map(|r| r.number(field)).collect();
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let first = mean(&dated[..mid]);
        let second = mean(&dated[mid..]);

        let change = if first != 0.0 {
            (second - first) / first * 100.0
        } else {
            0.0
        };
        let trend = if change > self.config.trend_threshold_pct {
            Trend::Up
        } else if change < -self.config.trend_threshold_pct {
            Trend::Down
        } else {
            Trend::Stable
        };
        (trend, change)
    }

    /// Single-pass, AND-combined filtering. Absent filters are no-ops.
    pub fn apply_filters(&self, records: &[Record], filters: &ReportFilters) -> Vec<Record> {
        if filters.is_empty() {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|record| Self::passes(record, filters))
            .cloned()
            .collect()
    }

    fn passes(record: &Record, filters: &ReportFilters) -> bool {
        if let Some(range) = filters.date_range {
            match record.timestamp() {
                Some(ts) if range.contains(ts) => {}
                _ => return false,
            }
        }
        if let Some(categories) = &filters.categories {
            let category = record
                .group_key("category")
                .or_else(|| record.group_key("type"));
            match category {
                Some(c) if categories.contains(&c) => {}
                _ => return false,
            }
        }
        if let Some(statuses) = &filters.statuses {
            match record.group_key("status") {
                Some(s) if statuses.contains(&s) => {}
                _ => return false,
            }
        }
        if filters.min_amount.is_some() || filters.max_amount.is_some() {
            let Some(amount) = record.number("amount") else {
                return false;
            };
            if filters.min_amount.map_or(false, |min| amount < min) {
                return false;
            }
            if filters.max_amount.map_or(false, |max| amount > max) {
                return false;
            }
        }
        if let Some(term) = &filters.search_term {
            let needle = term.to_lowercase();
            let hit = record.fields().any(|(_, value)| match value {
                Value::String(s) => s.to_lowercase().contains(&needle),
                Value::Number(n) => n.to_string().contains(&needle),
                Value::Bool(b) => b.to_string().contains(&needle),
                _ => false,
            });
            if !hit {
                return false;
            }
        }
        true
    }

    /// IQR outlier detection. Below the minimum numeric-value count, every
    /// record is returned as cleaned with zeroed statistics. Every record is
    /// partitioned; non-numeric values land in `cleaned`.
    pub fn detect_outliers(&self, records: &[Record], field: &str) -> OutlierReport {
        let mut values: Vec<f64> = records.iter().filter_map(|r| r.number(field)).collect();
        if values.len() < self.config.min_outlier_points {
            return OutlierReport {
                outliers: Vec::new(),
                cleaned: records.to_vec(),
                statistics: OutlierStatistics::default(),
            };
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let q1 = values[(values.len() as f64 * 0.25).floor() as usize];
        let q3 = values[(values.len() as f64 * 0.75).floor() as usize];
        let iqr = q3 - q1;
        let lower = q1 - self.config.iqr_multiplier * iqr;
        let upper = q3 + self.config.iqr_multiplier * iqr;

        let (outliers, cleaned): (Vec<Record>, Vec<Record>) =
            records.iter().cloned().partition(|record| {
                record
                    .number(field)
                    .map(|v| v < lower || v > upper)
                    .unwrap_or(false)
            });

        OutlierReport {
            outliers,
            cleaned,
            statistics: OutlierStatistics { q1, q3, iqr, lower, upper },
        }
    }

    /// Uniform sample without replacement. Reservoir sampling above
    /// `max_size`, direct copy otherwise; the result always holds exactly
    /// `min(records.len(), max_size)` items.
    pub fn sample(&self, records: &[Record], max_size: usize) -> Vec<Record> {
        if records.len() <= max_size {
            return records.to_vec();
        }
        let mut rng = rand::thread_rng();
        let mut reservoir: Vec<Record> = records[..max_size].to_vec();
        for (index, record) in records.iter().enumerate().skip(max_size) {
            let slot = rng.gen_range(0..=index);
            if slot < max_size {
                reservoir[slot] = record.clone();
            }
        }
        reservoir
    }

    /// Sample with the configured default reservoir size
    pub fn sample_default(&self, records: &[Record]) -> Vec<Record> {
        self.sample(records, self.config.default_sample_size)
    }

    /// Min-max scale `field` into a `{field}_normalized` attribute in [0,1].
    /// Identity copy when the field's range is 0.
    pub fn normalize(&self, records: &[Record], field: &str) -> Vec<Record> {
        let values: Vec<f64> = records.iter().filter_map(|r| r.number(field)).collect();
        let (min, max) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
        let range = max - min;
        if values.is_empty() || range == 0.0 {
            return records.to_vec();
        }

        let normalized_field = format!("{}_normalized", field);
        records
            .iter()
            .map(|record| match record.number(field) {
                Some(value) => {
                    let scaled = (value - min) / range;
                    record.with_field(
                        &normalized_field,
                        serde_json::Number::from_f64(scaled)
                            .map(Value::Number)
                            .unwrap_or(Value::Null),
                    )
                }
                None => record.clone(),
            })
            .collect()
    }

    /// Per-item required-field validation. Never aborts early; items missing
    /// a field are dropped from `valid_records` and reported by index.
    pub fn validate(
        &self,
        records: &[Record],
        required_fields: &[&str],
    ) -> Result<ValidationReport> {
        if required_fields.is_empty() {
            return Err(ReportError::Validation(
                "required fields list must not be empty".to_string(),
            ));
        }

        let mut errors = Vec::new();
        let mut valid_records = Vec::new();
        for (index, record) in records.iter().enumerate() {
            let missing: Vec<&str> = required_fields
                .iter()
                .copied()
                .filter(|f| !record.contains(f))
                .collect();
            if missing.is_empty() {
                valid_records.push(record.clone());
            } else {
                errors.push(format!("record {}: missing {}", index, missing.join(", ")));
            }
        }

        Ok(ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            valid_records,
        })
    }
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new(Arc::new(StrategyCatalog::standard()), ProcessingConfig::default())
    }
}
