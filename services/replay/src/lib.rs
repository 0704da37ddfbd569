//! XML Replay
//!
//! Re-emits captured per-message XML objects to a Kafka topic, reproducing
//! the captured inter-arrival gaps. Keys are grouped by the millisecond
//! timestamp in their file name; each group becomes one published batch.
//!
//! ```text
//! object store ──▶ S3ReplaySource ──▶ ReplayPacer ──▶ KafkaPublisher ──▶ topic
//!                  (list, coalesce,    (sleep gap)     (key = reading type)
//!                   download)
//! ```

pub mod config;
pub mod producer;
pub mod source;

pub use config::{
    Config, ConfigValidationError, LogFormat, ReplayConfig, SaslConfig, SaslMechanism,
    SecurityProtocol, ServiceConfig, SslConfig, StreamConfig,
};
pub use producer::{delivery_outcome, KafkaPublisher, ProducerError};
pub use source::{S3ReplaySource, SourceSettings};
