//! Read-only data-source seam

use crate::error::{ReportError, Result};
use crate::record::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Inclusive date range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Midpoint of the range, used to split one fetch into
    /// current/previous halves for comparisons
    pub fn midpoint(&self) -> DateTime<Utc> {
        let half = self.end.signed_duration_since(self.start) / 2;
        self.start + half
    }
}

/// Read-only query contract: fetch records of a kind within a date range.
/// The storage engine behind this is opaque to the core.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, kind: &str, range: DateRange) -> Result<Vec<Record>>;
}

/// In-memory data source, keyed by record kind. Used in tests and as the
/// default backing for embedded deployments.
#[derive(Default)]
pub struct MemoryDataSource {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    fetch_count: AtomicU64,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: &str, records: Vec<Record>) {
        self.collections
            .write()
            .entry(kind.to_string())
            .or_default()
            .extend(records);
    }

    /// Number of fetches served so far (cache-hit assertions in tests)
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn fetch(&self, kind: &str, range: DateRange) -> Result<Vec<Record>> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read();
        let records = collections
            .get(kind)
            .ok_or_else(|| ReportError::DataFetch(format!("unknown record kind: {}", kind)))?;

        Ok(records
            .iter()
            .filter(|r| r.timestamp().map(|ts| range.contains(ts)).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(s: &str) -> DateTime<Utc> {
        crate::record::parse_date(s).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_filters_by_range() {
        let source = MemoryDataSource::new();
        source.insert(
            "donations",
            vec![
                Record::from_pairs(&[("created_at", json!("2024-01-10")), ("amount", json!(10))]),
                Record::from_pairs(&[("created_at", json!("2024-03-10")), ("amount", json!(20))]),
            ],
        );

        let range = DateRange::new(day("2024-01-01"), day("2024-01-31"));
        let records = source.fetch("donations", range).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("amount"), Some(10.0));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_fetch_error() {
        let source = MemoryDataSource::new();
        let range = DateRange::new(day("2024-01-01"), day("2024-01-31"));
        let err = source.fetch("nope", range).await.unwrap_err();
        assert_eq!(err.error_code(), "DATA_FETCH_ERROR");
    }

    #[test]
    fn test_midpoint() {
        let range = DateRange::new(day("2024-01-01"), day("2024-01-31"));
        assert_eq!(range.midpoint(), day("2024-01-16"));
    }
}
