//! Export configuration, progress and result types

use crate::error::ErrorDetail;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Recognized export formats; anything else is a configuration error at
/// the parse boundary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Excel,
    Csv,
    Png,
    Svg,
}

impl ExportFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Png => "png",
            ExportFormat::Svg => "svg",
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv",
            ExportFormat::Png => "image/png",
            ExportFormat::Svg => "image/svg+xml",
        }
    }
}

/// Export job stages, strictly ordered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportStage {
    Preparing,
    Processing,
    Formatting,
    Finalizing,
    Completed,
    Error,
}

/// Per-format rendering options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default = "default_page_size")]
    pub page_size: String,

    #[serde(default = "default_orientation")]
    pub orientation: String,

    /// Page margins in points
    #[serde(default = "default_margin")]
    pub margin: u32,

    #[serde(default)]
    pub compression: bool,

    /// Image quality 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,

    #[serde(default = "default_chart_width")]
    pub chart_width: u32,

    #[serde(default = "default_chart_height")]
    pub chart_height: u32,

    #[serde(default = "default_chart_background")]
    pub chart_background: String,

    /// chrono format string applied to date cells
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Decimal precision is derived from the fractional part, e.g.
    /// `#,##0.00` formats with 2 decimals
    #[serde(default = "default_number_format")]
    pub number_format: String,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default = "default_true")]
    pub include_header: bool,

    /// Per-job deadline in seconds; checked at every suspension point
    pub deadline_secs: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            orientation: default_orientation(),
            margin: default_margin(),
            compression: false,
            quality: default_quality(),
            chart_width: default_chart_width(),
            chart_height: default_chart_height(),
            chart_background: default_chart_background(),
            date_format: default_date_format(),
            number_format: default_number_format(),
            delimiter: default_delimiter(),
            include_header: true,
            deadline_secs: None,
        }
    }
}

fn default_page_size() -> String {
    "A4".to_string()
}

fn default_orientation() -> String {
    "portrait".to_string()
}

fn default_margin() -> u32 {
    40
}

fn default_quality() -> u8 {
    90
}

fn default_chart_width() -> u32 {
    800
}

fn default_chart_height() -> u32 {
    400
}

fn default_chart_background() -> String {
    "#ffffff".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_number_format() -> String {
    "#,##0.00".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

/// Caller-supplied export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub filename: Option<String>,
    /// Accepted for configuration compatibility; the pipeline does not
    /// currently gate output on this flag
    #[serde(default = "default_true")]
    pub include_charts: bool,
    /// Accepted for configuration compatibility; the pipeline does not
    /// currently gate output on this flag
    #[serde(default = "default_true")]
    pub include_data: bool,
    pub template: Option<String>,
    #[serde(default)]
    pub options: ExportOptions,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            filename: None,
            include_charts: true,
            include_data: true,
            template: None,
            options: ExportOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMetadata {
    pub record_count: usize,
    pub processing_time_ms: u64,
    /// Fixed placeholder ratio when compression is requested; the pipeline
    /// does not actually compress artifacts
    pub compression_ratio: Option<f64>,
}

/// Outcome of one export job. Failures are carried here rather than raised,
/// so callers render a failure state without error handling at every site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub download_url: Option<String>,
    pub filename: Option<String>,
    pub file_size: Option<u64>,
    pub format: ExportFormat,
    pub error: Option<ErrorDetail>,
    pub metadata: Option<ExportMetadata>,
}

impl ExportResult {
    pub fn failure(format: ExportFormat, error: ErrorDetail) -> Self {
        Self {
            success: false,
            download_url: None,
            filename: None,
            file_size: None,
            format,
            error: Some(error),
            metadata: None,
        }
    }
}

/// One progress event as observed by the listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportProgress {
    pub stage: ExportStage,
    /// 0-100, monotonically non-decreasing per job
    pub progress: u8,
    pub message: String,
    pub eta_secs: Option<u64>,
}
