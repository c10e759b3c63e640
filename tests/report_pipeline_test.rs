//! End-to-end tests for the reporting and export pipeline

use reporting_engine::aggregation::types::{MetricConfig, MetricFormat, ReportFilters};
use reporting_engine::config::{EngineConfig, ExportSettings};
use reporting_engine::datasource::{DataSource, DateRange, MemoryDataSource};
use reporting_engine::export::pipeline::drain_progress;
use reporting_engine::export::progress::{CancelToken, ProgressSender};
use reporting_engine::export::types::{ExportConfig, ExportFormat, ExportStage};
use reporting_engine::export::ExportPipeline;
use reporting_engine::record::parse_date;
use reporting_engine::report::types::CustomReport;
use reporting_engine::{Record, ReportBuilder};
use serde_json::{json, Value};
use std::sync::Arc;

fn donation(date: &str, amount: f64, category: &str, recurring: bool) -> Record {
    Record::from_pairs(&[
        ("created_at", json!(date)),
        ("amount", json!(amount)),
        ("category", json!(category)),
        ("donor_type", json!("individual")),
        ("is_recurring", json!(recurring)),
        ("status", json!("approved")),
    ])
}

fn seeded_source() -> Arc<MemoryDataSource> {
    let source = Arc::new(MemoryDataSource::new());
    source.insert(
        "donations",
        vec![
            donation("2024-01-05", 100.0, "food", false),
            donation("2024-01-20", 200.0, "health", true),
            donation("2024-02-03", 150.0, "food", false),
            donation("2024-02-14", 50000.0, "education", false),
            donation("2024-03-01", 120.0, "food", true),
            donation("2024-03-15", 130.0, "health", false),
        ],
    );
    source.insert(
        "expenses",
        vec![
            Record::from_pairs(&[("created_at", json!("2024-01-10")), ("amount", json!(300.0))]),
            Record::from_pairs(&[("created_at", json!("2024-02-10")), ("amount", json!(200.0))]),
        ],
    );
    source.insert(
        "beneficiaries",
        vec![
            Record::from_pairs(&[
                ("created_at", json!("2024-01-08")),
                ("city", json!("Ankara")),
                ("gender", json!("female")),
            ]),
            Record::from_pairs(&[
                ("created_at", json!("2024-02-08")),
                ("city", json!("Ankara")),
                ("gender", json!("male")),
            ]),
            Record::from_pairs(&[
                ("created_at", json!("2024-03-08")),
                ("city", json!("Izmir")),
                ("gender", json!("female")),
            ]),
        ],
    );
    source
}

fn q1_range() -> DateRange {
    DateRange::new(
        parse_date("2024-01-01").unwrap(),
        parse_date("2024-03-31").unwrap(),
    )
}

fn custom_report(template: Option<&str>) -> CustomReport {
    CustomReport {
        name: "quarterly donations".to_string(),
        data_source: "donations".to_string(),
        date_range: q1_range(),
        filters: ReportFilters::default(),
        group_by: Some("category".to_string()),
        value_field: "amount".to_string(),
        metrics: vec![MetricConfig {
            key: "total_donations".to_string(),
            field: "amount".to_string(),
            strategy: "sum".to_string(),
            format: MetricFormat::Currency,
            icon: None,
            color: None,
        }],
        template: template.map(str::to_string),
        chart_type: Some("bar".to_string()),
    }
}

#[tokio::test]
async fn test_generate_report_shapes_payload() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source, EngineConfig::default());

    let response = builder.generate_report(&custom_report(None)).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.metadata.total_records, 6);

    let data = &response.data;
    assert_eq!(data["summary"]["total_records"], 6);
    assert_eq!(data["metrics"][0]["key"], "total_donations");
    assert_eq!(data["metrics"][0]["value"], 50700.0);

    let categories = data["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 3);
    let pct_sum: f64 = categories
        .iter()
        .map(|c| c["percentage"].as_f64().unwrap())
        .sum();
    assert!((pct_sum - 100.0).abs() < 1e-6);

    assert!(data["comparison"]["current"].as_f64().is_some());
}

#[tokio::test]
async fn test_template_transform_applies_before_caching() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source, EngineConfig::default());

    let response = builder
        .generate_report(&custom_report(Some("detailed")))
        .await
        .unwrap();
    assert_eq!(response.data["view"], "detailed");

    // Unknown template ids are a pass-through, not an error
    let response = builder
        .generate_report(&custom_report(Some("no-such-template")))
        .await
        .unwrap();
    assert!(response.data.get("view").is_none());
}

#[tokio::test]
async fn test_cache_round_trip_and_ttl_expiry() {
    let source = seeded_source();
    let mut config = EngineConfig::default();
    config.reporting.cache_ttl_secs = 1;
    let builder = ReportBuilder::new(source.clone(), config);

    let report = custom_report(None);
    builder.generate_report(&report).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // Within the TTL the data source is not consulted again
    builder.generate_report(&report).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    builder.generate_report(&report).await.unwrap();
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_financial_report_totals() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source, EngineConfig::default());

    let response = builder
        .generate_financial_report(q1_range(), &ReportFilters::default())
        .await
        .unwrap();
    let data = response.data;
    assert_eq!(data.total_donations, 50700.0);
    assert_eq!(data.total_expenses, 500.0);
    assert_eq!(data.net_income, 50200.0);
    assert_eq!(data.donations_count, 6);
    assert_eq!(data.expenses_count, 2);
}

#[tokio::test]
async fn test_donation_analytics_segmentation() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source, EngineConfig::default());

    let response = builder
        .generate_donation_analytics(q1_range(), &ReportFilters::default())
        .await
        .unwrap();
    let data = response.data;
    assert_eq!(data.total_count, 6);
    assert_eq!(data.recurring_count, 2);
    assert!((data.average_amount - 50700.0 / 6.0).abs() < 1e-9);
    assert_eq!(data.donor_types.len(), 1);
    assert_eq!(data.donor_types[0].count, 6);

    let five_k_plus = data
        .by_amount_range
        .iter()
        .find(|r| r.range == "5000+")
        .unwrap();
    assert_eq!(five_k_plus.count, 1);
    assert_eq!(five_k_plus.total, 50000.0);

    assert_eq!(data.by_frequency.len(), 2);
    assert_eq!(data.monthly_donations.len(), 3);
}

#[tokio::test]
async fn test_impact_report_breakdowns() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source, EngineConfig::default());

    let response = builder
        .generate_impact_report(q1_range(), &ReportFilters::default())
        .await
        .unwrap();
    let data = response.data;
    assert_eq!(data.total_beneficiaries, 3);

    let ankara = data.by_location.iter().find(|l| l.city == "Ankara").unwrap();
    assert_eq!(ankara.count, 2);
    assert!((ankara.percentage - 200.0 / 3.0).abs() < 1e-9);

    let female = data.by_gender.iter().find(|g| g.gender == "female").unwrap();
    assert_eq!(female.count, 2);
}

#[tokio::test]
async fn test_outlier_scenario_through_engine() {
    let source = seeded_source();
    let builder = ReportBuilder::new(source.clone(), EngineConfig::default());

    let records = source.fetch("donations", q1_range()).await.unwrap();
    let report = builder.engine().detect_outliers(&records, "amount");
    assert_eq!(report.outliers.len(), 1);
    assert_eq!(report.outliers[0].number("amount"), Some(50000.0));
    assert_eq!(report.cleaned.len(), 5);
}

#[tokio::test]
async fn test_large_csv_export_takes_chunked_path() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ExportPipeline::new(ExportSettings {
        output_dir: dir.path().to_string_lossy().into_owned(),
        ..ExportSettings::default()
    });

    let rows: Vec<Value> = (0..12_000)
        .map(|i| json!({"id": i, "amount": (i % 97) as f64}))
        .collect();
    let (sender, mut rx) = ProgressSender::channel(256);
    let config = ExportConfig {
        filename: Some("large".to_string()),
        ..ExportConfig::default()
    };

    let result = pipeline
        .export(Value::Array(rows), &config, Some(&sender), &CancelToken::new())
        .await
        .unwrap();
    drop(sender);
    assert!(result.success);
    assert_eq!(result.metadata.as_ref().unwrap().record_count, 12_000);

    let events = drain_progress(&mut rx);
    let processing_idx = events
        .iter()
        .position(|e| e.stage == ExportStage::Processing)
        .expect("a processing event must be emitted");
    let completed_idx = events
        .iter()
        .position(|e| e.stage == ExportStage::Completed)
        .expect("a completed event must be emitted");
    assert!(processing_idx < completed_idx);

    // Progress is monotonically non-decreasing for a single listener
    let mut last = 0;
    for event in &events {
        assert!(event.progress >= last);
        last = event.progress;
    }

    // 12,000 rows plus header
    let written = std::fs::read_to_string(dir.path().join("large.csv")).unwrap();
    assert_eq!(written.lines().count(), 12_001);
}

#[tokio::test]
async fn test_export_handoff_from_builder() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ExportPipeline::new(ExportSettings {
        output_dir: dir.path().to_string_lossy().into_owned(),
        ..ExportSettings::default()
    });
    let builder = ReportBuilder::new(seeded_source(), EngineConfig::default());

    let result = builder
        .export_report(
            &custom_report(None),
            &pipeline,
            ExportFormat::Excel,
            Some("quarterly".to_string()),
        )
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.filename.as_deref(), Some("quarterly.xlsx"));
    assert_eq!(result.download_url.as_deref().map(|u| u.ends_with("quarterly.xlsx")), Some(true));

    let written = std::fs::read_to_string(dir.path().join("quarterly.xlsx")).unwrap();
    assert!(written.contains("<Workbook"));
}

#[tokio::test]
async fn test_export_failure_for_unknown_data_source() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ExportPipeline::new(ExportSettings {
        output_dir: dir.path().to_string_lossy().into_owned(),
        ..ExportSettings::default()
    });
    let builder = ReportBuilder::new(seeded_source(), EngineConfig::default());

    let mut report = custom_report(None);
    report.data_source = "missing".to_string();
    let result = builder
        .export_report(&report, &pipeline, ExportFormat::Csv, None)
        .await
        .unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, "DATA_FETCH_ERROR");
    assert!(error.retryable);
}
