//! Error types for the reporting engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ReportError>;

/// Error severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Errors raised by the reporting and export pipeline
#[derive(Error, Debug)]
pub enum ReportError {
    /// Malformed or inconsistent data
    #[error("Data error: {0}")]
    Data(String),

    /// The data-source collaborator failed to return records
    #[error("Data fetch failed: {0}")]
    DataFetch(String),

    /// Aggregation or shaping failed
    #[error("Processing error: {0}")]
    Processing(String),

    /// Export job failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Scheduling conflict
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Caller is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Invalid configuration or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure while talking to a collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// A second export was started while one is in flight
    #[error("An export is already in progress for this session")]
    ExportInProgress,

    /// The job was cancelled by the caller
    #[error("Export cancelled")]
    Cancelled,

    /// The per-job deadline elapsed before the export finished
    #[error("Export deadline exceeded")]
    DeadlineExceeded,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ReportError {
    /// Get the taxonomy code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ReportError::Data(_) => "DATA_ERROR",
            ReportError::DataFetch(_) => "DATA_FETCH_ERROR",
            ReportError::Processing(_) => "PROCESSING_ERROR",
            ReportError::Export(_) | ReportError::Cancelled | ReportError::DeadlineExceeded => {
                "EXPORT_ERROR"
            }
            ReportError::Schedule(_) | ReportError::ExportInProgress => "SCHEDULE_ERROR",
            ReportError::Permission(_) => "PERMISSION_ERROR",
            ReportError::Validation(_) => "VALIDATION_ERROR",
            ReportError::Network(_) => "NETWORK_ERROR",
            ReportError::Io(_) => "EXPORT_ERROR",
            ReportError::Serialization(_) => "PROCESSING_ERROR",
        }
    }

    /// Get the severity for this error
    pub fn severity(&self) -> Severity {
        match self {
            ReportError::DataFetch(_) | ReportError::Network(_) => Severity::High,
            ReportError::Data(_) | ReportError::Processing(_) => Severity::Medium,
            ReportError::Export(_) | ReportError::Io(_) => Severity::Medium,
            ReportError::DeadlineExceeded => Severity::High,
            ReportError::Permission(_) => Severity::High,
            ReportError::Validation(_) | ReportError::Schedule(_) => Severity::Low,
            ReportError::ExportInProgress | ReportError::Cancelled => Severity::Low,
            ReportError::Serialization(_) => Severity::Medium,
        }
    }

    /// Whether the caller can recover by changing inputs or state
    pub fn recoverable(&self) -> bool {
        !matches!(self, ReportError::Permission(_))
    }

    /// Whether retrying the same call may succeed
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ReportError::DataFetch(_)
                | ReportError::Network(_)
                | ReportError::ExportInProgress
                | ReportError::DeadlineExceeded
                | ReportError::Io(_)
        )
    }

    /// Build the structured error envelope surfaced to callers
    pub fn detail(&self, context: serde_json::Value) -> ErrorDetail {
        ErrorDetail {
            error_type: self.error_code().to_string(),
            severity: self.severity(),
            message: self.to_string(),
            code: self.error_code().to_string(),
            context,
            timestamp: Utc::now(),
            recoverable: self.recoverable(),
            retryable: self.retryable(),
        }
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ReportError {
    fn from(err: config::ConfigError) -> Self {
        ReportError::Validation(err.to_string())
    }
}

/// Structured error surfaced in report responses and export results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub severity: Severity,
    pub message: String,
    pub code: String,
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
    pub retryable: bool,
}
