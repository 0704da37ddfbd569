//! Configuration for the flattening job.
//!
//! Values come from, in increasing precedence: built-in defaults,
//! `config/flattener.*`, `/etc/xml-telemetry/flattener.*`, then environment
//! variables such as `FLATTENER__S3__BUCKET`.

use serde::Deserialize;
use telemetry_core::{DatePartition, KeyError, ReadingCategory, S3Config};

/// Main configuration for the flattener
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Job configuration
    #[serde(default)]
    pub job: JobConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port, disabled when unset
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// What to do with a message that does not match its schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaErrorPolicy {
    /// Abort the job on the first bad message
    #[default]
    Halt,
    /// Log the message, count it and keep going
    Skip,
}

/// Layout of the uploaded tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Header row plus every value quoted
    #[default]
    Csv,
    /// Fixed acoustic columns, pipe-delimited, no header
    Delimited,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Delimited => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "text/csv",
            OutputFormat::Delimited => "text/plain",
        }
    }
}

/// Job configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Root under which raw compacted files are partitioned
    #[serde(default = "default_source_root")]
    pub source_root: String,
    /// Root under which flattened tables are written
    #[serde(default = "default_output_root")]
    pub output_root: String,
    /// Byte ceiling for one download batch
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
    /// Concurrent downloads within a batch
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    /// Reading types the job accepts (empty = any)
    #[serde(default = "default_reading_types")]
    pub reading_types: Vec<String>,
    /// Reading types that use the signal schema; all others are components
    #[serde(default = "default_signal_reading_types")]
    pub signal_reading_types: Vec<String>,
    #[serde(default)]
    pub on_schema_error: SchemaErrorPolicy,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// One reading type and day to flatten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTarget {
    pub reading_type: String,
    pub date: DatePartition,
}

fn default_service_name() -> String {
    "xml-flattener".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_root() -> String {
    "bhp/legacy-data-snapshot/unpacked-raw".to_string()
}

fn default_output_root() -> String {
    "bhp/legacy-data-snapshot/flattened".to_string()
}

fn default_max_batch_bytes() -> u64 {
    300_000_000
}

fn default_download_concurrency() -> usize {
    10
}

fn default_reading_types() -> Vec<String> {
    ["ACOUSTIC", "WILD", "CYCLE", "HOTBOX", "WPROF", "BRAKE", "CONSIST"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_signal_reading_types() -> Vec<String> {
    vec!["ACOUSTIC".to_string()]
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            output_root: default_output_root(),
            max_batch_bytes: default_max_batch_bytes(),
            download_concurrency: default_download_concurrency(),
            reading_types: default_reading_types(),
            signal_reading_types: default_signal_reading_types(),
            on_schema_error: SchemaErrorPolicy::default(),
            output_format: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(config::File::with_name("config/flattener").required(false))
            .add_source(config::File::with_name("/etc/xml-telemetry/flattener").required(false))
            // FLATTENER__JOB__MAX_BATCH_BYTES -> job.max_batch_bytes
            .add_source(
                config::Environment::with_prefix("FLATTENER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.s3.bucket.is_empty() {
            return Err(ConfigValidationError::MissingField("s3.bucket".to_string()));
        }

        if self.job.max_batch_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "job.max_batch_bytes".to_string(),
                message: "Batch ceiling must be greater than 0".to_string(),
            });
        }

        if self.job.download_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "job.download_concurrency".to_string(),
                message: "Concurrency must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Resolve and validate the reading type and day passed on the command line
    pub fn target(
        &self,
        reading_type: &str,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<JobTarget, ConfigValidationError> {
        if reading_type.is_empty() {
            return Err(ConfigValidationError::MissingField("reading_type".to_string()));
        }

        if !self.job.reading_types.is_empty()
            && !self.job.reading_types.iter().any(|t| t == reading_type)
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "reading_type".to_string(),
                message: format!(
                    "{reading_type} is not one of {}",
                    self.job.reading_types.join(", ")
                ),
            });
        }

        let date = DatePartition::new(year, month, day).map_err(|e: KeyError| {
            ConfigValidationError::InvalidValue {
                field: "date".to_string(),
                message: e.to_string(),
            }
        })?;

        if self.job.output_format == OutputFormat::Delimited
            && self.job.category(reading_type) != ReadingCategory::Signal
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "job.output_format".to_string(),
                message: format!("delimited output needs a signal reading type, got {reading_type}"),
            });
        }

        Ok(JobTarget {
            reading_type: reading_type.to_string(),
            date,
        })
    }
}

impl JobConfig {
    /// Schema used for `reading_type`
    pub fn category(&self, reading_type: &str) -> ReadingCategory {
        if self.signal_reading_types.iter().any(|t| t == reading_type) {
            ReadingCategory::Signal
        } else {
            ReadingCategory::Component
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
