//! Named report template transforms
//!
//! Templates reshape the aggregated payload before caching. The registry is
//! built once at startup; unknown template ids are a pass-through, never an
//! error.

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The process-wide registry, built once on first use
static STANDARD: Lazy<Arc<TemplateRegistry>> = Lazy::new(|| Arc::new(TemplateRegistry::standard()));

/// Shared handle to the standard registry
pub fn standard_registry() -> Arc<TemplateRegistry> {
    Arc::clone(&STANDARD)
}

type Transform = Box<dyn Fn(Value) -> Value + Send + Sync>;

pub struct TemplateRegistry {
    transforms: HashMap<&'static str, Transform>,
}

impl TemplateRegistry {
    pub fn standard() -> Self {
        let mut transforms: HashMap<&'static str, Transform> = HashMap::new();

        transforms.insert("default", Box::new(|payload| payload));

        // Executive view: summary and metrics only, detail series dropped
        transforms.insert(
            "executive",
            Box::new(|payload| match payload {
                Value::Object(mut obj) => {
                    obj.remove("time_series");
                    obj.remove("comparison");
                    obj.insert("view".to_string(), json!("executive"));
                    Value::Object(obj)
                }
                other => other,
            }),
        );

        // Detailed view: full payload plus section markers
        transforms.insert(
            "detailed",
            Box::new(|payload| match payload {
                Value::Object(mut obj) => {
                    obj.insert("view".to_string(), json!("detailed"));
                    obj.insert(
                        "sections".to_string(),
                        json!(["summary", "metrics", "time_series", "categories", "comparison"]),
                    );
                    Value::Object(obj)
                }
                other => other,
            }),
        );

        // Presentation view: chart-facing series only
        transforms.insert(
            "presentation",
            Box::new(|payload| match payload {
                Value::Object(mut obj) => {
                    obj.remove("warnings");
                    obj.insert("view".to_string(), json!("presentation"));
                    Value::Object(obj)
                }
                other => other,
            }),
        );

        transforms.insert(
            "financial",
            Box::new(|payload| match payload {
                Value::Object(mut obj) => {
                    obj.insert("view".to_string(), json!("financial"));
                    obj.insert("currency".to_string(), json!("TRY"));
                    Value::Object(obj)
                }
                other => other,
            }),
        );

        transforms.insert(
            "donation",
            Box::new(|payload| match payload {
                Value::Object(mut obj) => {
                    obj.insert("view".to_string(), json!("donation"));
                    Value::Object(obj)
                }
                other => other,
            }),
        );

        Self { transforms }
    }

    /// Apply a named transform; unknown or absent names pass through
    pub fn apply(&self, name: Option<&str>, payload: Value) -> Value {
        match name.and_then(|n| self.transforms.get(n)) {
            Some(transform) => transform(payload),
            None => payload,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.transforms.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
