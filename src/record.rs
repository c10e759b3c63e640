//! Field-keyed records supplied by the data-source collaborator

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque field-keyed record. The core reads records but never mutates
/// them; operations that enrich records (normalization) return new copies.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from field/value pairs
    pub fn from_pairs(pairs: &[(&str, Value)]) -> Self {
        let mut map = Map::new();
        for (key, value) in pairs {
            map.insert((*key).to_string(), value.clone());
        }
        Self(map)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(v) if !v.is_null())
    }

    /// Numeric view of a field, if it holds a finite number
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.0.get(field) {
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// String view of a field
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Boolean view of a field
    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    /// Parse a field as a UTC timestamp. Accepts RFC 3339 timestamps and
    /// bare `YYYY-MM-DD` day strings (interpreted as midnight UTC).
    pub fn date(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.text(field)?;
        parse_date(raw)
    }

    /// Timestamp used for date filtering: `created_at` falling back to `date`
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date("created_at").or_else(|| self.date("date"))
    }

    /// Stringified group key for a field; missing or null maps to `None`
    pub fn group_key(&self, field: &str) -> Option<String> {
        match self.0.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// New record with one additional field set
    pub fn with_field(&self, field: &str, value: Value) -> Self {
        let mut map = self.0.clone();
        map.insert(field.to_string(), value);
        Self(map)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parse an RFC 3339 timestamp or a bare ISO day string
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_ignores_strings() {
        let rec = Record::from_pairs(&[("amount", json!("100")), ("count", json!(3))]);
        assert_eq!(rec.number("amount"), None);
        assert_eq!(rec.number("count"), Some(3.0));
    }

    #[test]
    fn test_date_parses_day_and_rfc3339() {
        let rec = Record::from_pairs(&[
            ("date", json!("2024-01-15")),
            ("created_at", json!("2024-01-15T10:30:00Z")),
        ]);
        assert_eq!(rec.date("date").unwrap().to_rfc3339(), "2024-01-15T00:00:00+00:00");
        assert!(rec.date("created_at").is_some());
    }

    #[test]
    fn test_group_key_stringifies_non_strings() {
        let rec = Record::from_pairs(&[("city", json!("A")), ("zone", json!(7)), ("gone", json!(null))]);
        assert_eq!(rec.group_key("city").as_deref(), Some("A"));
        assert_eq!(rec.group_key("zone").as_deref(), Some("7"));
        assert_eq!(rec.group_key("gone"), None);
        assert_eq!(rec.group_key("missing"), None);
    }

    #[test]
    fn test_with_field_does_not_mutate_original() {
        let rec = Record::from_pairs(&[("a", json!(1))]);
        let enriched = rec.with_field("b", json!(2));
        assert!(!rec.contains("b"));
        assert!(enriched.contains("b"));
    }
}
