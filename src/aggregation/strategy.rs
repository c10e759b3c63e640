//! Named aggregation strategies and their read-only catalog

use crate::error::{ReportError, Result};
use crate::record::Record;
use std::collections::HashMap;
use std::sync::Arc;

/// Value types a strategy declares support for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedType {
    Numeric,
    Any,
}

/// A named, stateless reduction over a record group. Strategies are shared
/// process-wide through the catalog and must stay stateless.
pub trait AggregationStrategy: Send + Sync {
    /// Reduce the group to a single number. `field` is required by every
    /// strategy except count.
    fn aggregate(&self, records: &[Record], field: Option<&str>) -> Result<f64>;

    /// Whether the group is acceptable input for this strategy
    fn validate(&self, records: &[Record], field: Option<&str>) -> bool;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn supported_type(&self) -> SupportedType {
        SupportedType::Numeric
    }
}

fn numeric_values(records: &[Record], field: Option<&str>, name: &str) -> Result<Vec<f64>> {
    let field = field
        .ok_or_else(|| ReportError::Validation(format!("{} requires a value field", name)))?;
    Ok(records.iter().filter_map(|r| r.number(field)).collect())
}

pub struct SumStrategy;

impl AggregationStrategy for SumStrategy {
    fn aggregate(&self, records: &[Record], field: Option<&str>) -> Result<f64> {
        Ok(numeric_values(records, field, self.name())?.iter().sum())
    }

    fn validate(&self, records: &[Record], field: Option<&str>) -> bool {
        field.is_some() && records.iter().any(|r| r.number(field.unwrap_or("")).is_some())
    }

    fn name(&self) -> &'static str {
        "sum"
    }

    fn description(&self) -> &'static str {
        "Sum of a numeric field across the group"
    }
}

pub struct AvgStrategy;

impl AggregationStrategy for AvgStrategy {
    fn aggregate(&self, records: &[Record], field: Option<&str>) -> Result<f64> {
        let values = numeric_values(records, field, self.name())?;
        if values.is_empty() {
            return Err(ReportError::Processing(
                "no numeric values to average".to_string(),
            ));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    fn validate(&self, records: &[Record], field: Option<&str>) -> bool {
        field.is_some() && records.iter().any(|r| r.number(field.unwrap_or("")).is_some())
    }

    fn name(&self) -> &'static str {
        "avg"
    }

    fn description(&self) -> &'static str {
        "Arithmetic mean of a numeric field across the group"
    }
}

pub struct CountStrategy;

impl AggregationStrategy for CountStrategy {
    fn aggregate(&self, records: &[Record], _field: Option<&str>) -> Result<f64> {
        Ok(records.len() as f64)
    }

    fn validate(&self, _records: &[Record], _field: Option<&str>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "count"
    }

    fn description(&self) -> &'static str {
        "Number of records in the group"
    }

    fn supported_type(&self) -> SupportedType {
        SupportedType::Any
    }
}

pub struct MinStrategy;

impl AggregationStrategy for MinStrategy {
    fn aggregate(&self, records: &[Record], field: Option<&str>) -> Result<f64> {
        numeric_values(records, field, self.name())?
            .into_iter()
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
            .ok_or_else(|| ReportError::Processing("no numeric values for min".to_string()))
    }

    fn validate(&self, records: &[Record], field: Option<&str>) -> bool {
        field.is_some() && records.iter().any(|r| r.number(field.unwrap_or("")).is_some())
    }

    fn name(&self) -> &'static str {
        "min"
    }

    fn description(&self) -> &'static str {
        "Smallest value of a numeric field across the group"
    }
}

pub struct MaxStrategy;

impl AggregationStrategy for MaxStrategy {
    fn aggregate(&self, records: &[Record], field: Option<&str>) -> Result<f64> {
        numeric_values(records, field, self.name())?
            .into_iter()
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
            .ok_or_else(|| ReportError::Processing("no numeric values for max".to_string()))
    }

    fn validate(&self, records: &[Record], field: Option<&str>) -> bool {
        field.is_some() && records.iter().any(|r| r.number(field.unwrap_or("")).is_some())
    }

    fn name(&self) -> &'static str {
        "max"
    }

    fn description(&self) -> &'static str {
        "Largest value of a numeric field across the group"
    }
}

/// Read-only strategy catalog, built once and shared via `Arc`.
/// Dependency-injected into the engine and builder rather than held as
/// ambient global state.
pub struct StrategyCatalog {
    strategies: HashMap<&'static str, Arc<dyn AggregationStrategy>>,
}

impl StrategyCatalog {
    pub fn standard() -> Self {
        let mut strategies: HashMap<&'static str, Arc<dyn AggregationStrategy>> = HashMap::new();
        for strategy in [
            Arc::new(SumStrategy) as Arc<dyn AggregationStrategy>,
            Arc::new(AvgStrategy),
            Arc::new(CountStrategy),
            Arc::new(MinStrategy),
            Arc::new(MaxStrategy),
        ] {
            strategies.insert(strategy.name(), strategy);
        }
        Self { strategies }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AggregationStrategy>> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
