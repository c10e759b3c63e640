use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Report builder configuration
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Aggregation / processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportSettings,
}

impl EngineConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: REPORTING_)
            .add_source(
                config::Environment::with_prefix("REPORTING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reporting: ReportingConfig::default(),
            processing: ProcessingConfig::default(),
            export: ExportSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Cache entry time-to-live (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached report responses
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Default page size reported in response metadata
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            default_page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Percentage threshold separating up/down from stable trends
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold_pct: f64,

    /// Default reservoir sample size
    #[serde(default = "default_sample_size")]
    pub default_sample_size: usize,

    /// IQR multiplier for outlier bounds
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,

    /// Minimum numeric values required for outlier detection
    #[serde(default = "default_min_outlier_points")]
    pub min_outlier_points: usize,

    /// Minimum records required for trend classification
    #[serde(default = "default_min_trend_points")]
    pub min_trend_points: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            trend_threshold_pct: default_trend_threshold(),
            default_sample_size: default_sample_size(),
            iqr_multiplier: default_iqr_multiplier(),
            min_outlier_points: default_min_outlier_points(),
            min_trend_points: default_min_trend_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Items per processing chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Item count above which the chunked path is taken
    #[serde(default = "default_optimization_threshold")]
    pub optimization_threshold: usize,

    /// Yield to the scheduler every N chunks
    #[serde(default = "default_yield_every_chunks")]
    pub yield_every_chunks: usize,

    /// Bounded worker pool size for chunk processing
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Resident memory ceiling (bytes) before pausing between chunks
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,

    /// Capacity of the bounded progress channel
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,

    /// Directory artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            optimization_threshold: default_optimization_threshold(),
            yield_every_chunks: default_yield_every_chunks(),
            worker_count: default_worker_count(),
            max_memory_bytes: default_max_memory_bytes(),
            progress_channel_capacity: default_progress_channel_capacity(),
            output_dir: default_output_dir(),
        }
    }
}

// Default value functions
fn default_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_cache_capacity() -> usize {
    100
}

fn default_page_size() -> usize {
    1000
}

fn default_trend_threshold() -> f64 {
    5.0
}

fn default_sample_size() -> usize {
    1000
}

fn default_iqr_multiplier() -> f64 {
    1.5
}

fn default_min_outlier_points() -> usize {
    4
}

fn default_min_trend_points() -> usize {
    2
}

fn default_chunk_size() -> usize {
    1000
}

fn default_optimization_threshold() -> usize {
    5000
}

fn default_yield_every_chunks() -> usize {
    10
}

fn default_worker_count() -> usize {
    4
}

fn default_max_memory_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_progress_channel_capacity() -> usize {
    64
}

fn default_output_dir() -> String {
    "exports".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.reporting.cache_ttl_secs, 300);
        assert_eq!(cfg.reporting.cache_capacity, 100);
        assert_eq!(cfg.export.chunk_size, 1000);
        assert_eq!(cfg.export.optimization_threshold, 5000);
        assert_eq!(cfg.processing.trend_threshold_pct, 5.0);
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let parsed: EngineConfig = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();
        assert_eq!(parsed.export.worker_count, 4);
        assert_eq!(parsed.export.output_dir, "exports");
    }
}
