//! Configuration for the replay service.
//!
//! Loaded from `config/replay.*`, `/etc/xml-telemetry/replay.*` and `REPLAY__`
//! prefixed environment variables, in that order of precedence (lowest first).

use rdkafka::config::ClientConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use telemetry_core::{DatePartition, KeyError, S3Config};
use thiserror::Error;

/// Configuration validation errors
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main configuration for the replay service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    pub s3: S3Config,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
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

/// Security protocol for broker connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }

    fn uses_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaslMechanism {
    #[default]
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslConfig {
    /// Path to CA certificate file
    pub ca_location: Option<String>,
    pub certificate_location: Option<String>,
    pub key_location: Option<String>,
    pub key_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaslConfig {
    #[serde(default)]
    pub mechanism: SaslMechanism,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Stream (Kafka topic) the replay publishes to
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Comma-separated list of broker addresses
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic the batches are published to
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default)]
    pub security_protocol: SecurityProtocol,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub sasl: SaslConfig,
    /// Required acknowledgments: 0, 1, or all
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Compression type: none, gzip, snappy, lz4, zstd
    #[serde(default = "default_compression")]
    pub compression_type: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
    /// Upper bound for delivering one whole batch
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Additional librdkafka properties
    #[serde(default)]
    pub extra_properties: HashMap<String, String>,
}

/// What to replay
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Root under which raw per-message objects are partitioned
    #[serde(default = "default_source_root")]
    pub source_root: String,
    /// Reading type, also the partition key of every record
    #[serde(default)]
    pub reading_type: String,
    #[serde(default = "default_year")]
    pub year: i32,
    #[serde(default = "default_month")]
    pub month: u32,
    /// Days of the month, strictly increasing
    #[serde(default = "default_days")]
    pub days: Vec<u32>,
    /// Start again from the first day once the last one is exhausted
    #[serde(default)]
    pub cycle: bool,
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
}

fn default_service_name() -> String {
    "xml-replay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "xml-replay".to_string()
}

fn default_stream_name() -> String {
    "telemetry.replay".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_linger_ms() -> u64 {
    5
}

fn default_publish_timeout_ms() -> u64 {
    30000
}

fn default_source_root() -> String {
    "bhp/legacy-data-snapshot/unpacked-raw".to_string()
}

fn default_year() -> i32 {
    2023
}

fn default_month() -> u32 {
    1
}

fn default_days() -> Vec<u32> {
    vec![1]
}

fn default_download_concurrency() -> usize {
    10
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

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            client_id: default_client_id(),
            stream_name: default_stream_name(),
            security_protocol: SecurityProtocol::default(),
            ssl: SslConfig::default(),
            sasl: SaslConfig::default(),
            acks: default_acks(),
            retries: default_retries(),
            compression_type: default_compression(),
            linger_ms: default_linger_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            extra_properties: HashMap::new(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            reading_type: String::new(),
            year: default_year(),
            month: default_month(),
            days: default_days(),
            cycle: false,
            download_concurrency: default_download_concurrency(),
        }
    }
}

impl StreamConfig {
    /// Build the rdkafka producer configuration
    pub fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("client.id", &self.client_id);
        config.set("security.protocol", self.security_protocol.as_str());

        if let Some(ref ca) = self.ssl.ca_location {
            config.set("ssl.ca.location", ca);
        }
        if let Some(ref cert) = self.ssl.certificate_location {
            config.set("ssl.certificate.location", cert);
        }
        if let Some(ref key) = self.ssl.key_location {
            config.set("ssl.key.location", key);
        }
        if let Some(ref password) = self.ssl.key_password {
            config.set("ssl.key.password", password);
        }

        if self.security_protocol.uses_sasl() {
            config.set("sasl.mechanism", self.sasl.mechanism.as_str());
            if let Some(ref username) = self.sasl.username {
                config.set("sasl.username", username);
            }
            if let Some(ref password) = self.sasl.password {
                config.set("sasl.password", password);
            }
        }

        config.set("acks", &self.acks);
        config.set("retries", self.retries.to_string());
        config.set("compression.type", &self.compression_type);
        config.set("linger.ms", self.linger_ms.to_string());
        config.set("message.timeout.ms", self.publish_timeout_ms.to_string());

        for (key, value) in &self.extra_properties {
            config.set(key, value);
        }

        config
    }

    /// Get the whole-batch publish timeout as Duration
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl ReplayConfig {
    /// Day partitions to replay, in order
    pub fn dates(&self) -> Result<Vec<DatePartition>, KeyError> {
        self.days
            .iter()
            .map(|day| DatePartition::new(self.year, self.month, *day))
            .collect()
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            .add_source(config::File::with_name("config/replay").required(false))
            .add_source(config::File::with_name("/etc/xml-telemetry/replay").required(false))
            // REPLAY__STREAM__BOOTSTRAP_SERVERS -> stream.bootstrap_servers
            .add_source(
                config::Environment::with_prefix("REPLAY")
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

        if self.stream.bootstrap_servers.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "stream.bootstrap_servers".to_string(),
            ));
        }

        if self.stream.stream_name.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "stream.stream_name".to_string(),
            ));
        }

        if self.stream.security_protocol.uses_sasl() && self.stream.sasl.username.is_none() {
            return Err(ConfigValidationError::MissingField(
                "stream.sasl.username (required for SASL)".to_string(),
            ));
        }

        if self.replay.reading_type.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "replay.reading_type".to_string(),
            ));
        }

        if self.replay.days.is_empty() {
            return Err(ConfigValidationError::MissingField("replay.days".to_string()));
        }

        if let Err(e) = self.replay.dates() {
            return Err(ConfigValidationError::InvalidValue {
                field: "replay.days".to_string(),
                message: e.to_string(),
            });
        }

        // One coalescer spans a whole cycle, so timestamps must rise day to day
        if self.replay.days.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigValidationError::InvalidValue {
                field: "replay.days".to_string(),
                message: "Days must be strictly increasing".to_string(),
            });
        }

        if self.replay.download_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "replay.download_concurrency".to_string(),
                message: "Concurrency must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            s3: S3Config {
                bucket: "telemetry".to_string(),
                region: "ap-southeast-2".to_string(),
                endpoint_url: None,
                force_path_style: false,
            },
            stream: StreamConfig::default(),
            replay: ReplayConfig {
                reading_type: "ACOUSTIC".to_string(),
                ..ReplayConfig::default()
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_reading_type() {
        let mut config = create_test_config();
        config.replay.reading_type.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_day_rejected() {
        let mut config = create_test_config();
        config.replay.days = vec![1, 32];
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_sasl_requires_username() {
        let mut config = create_test_config();
        config.stream.security_protocol = SecurityProtocol::SaslSsl;
        assert!(config.validate().is_err());

        config.stream.sasl.username = Some("replay".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_producer_config_build() {
        let config = create_test_config();
        let producer_config = config.stream.build_producer_config();

        assert_eq!(producer_config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(producer_config.get("message.timeout.ms"), Some("30000"));
        assert!(producer_config.get("sasl.mechanism").is_none());
    }

    #[test]
    fn test_unsorted_days_rejected() {
        let mut config = create_test_config();
        config.replay.days = vec![3, 1];
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { ref field, .. }) if field == "replay.days"
        ));

        config.replay.days = vec![1, 1];
        assert!(config.validate().is_err());

        config.replay.days = vec![1, 2, 5];
        assert!(config.validate().is_ok());
    }
}
