//! Kafka-backed [`StreamPublisher`].
//!
//! The stream name is the topic and the partition key is the message key.
//! A batch is sent as concurrent deliveries awaited together; each record's
//! acknowledgment becomes a [`RecordOutcome`].

use crate::config::StreamConfig;
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use telemetry_core::{PublishError, RecordOutcome, StreamPublisher};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Failed to create producer: {0}")]
    Creation(#[from] KafkaError),
}

/// Publishes replay batches to Kafka
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &StreamConfig) -> Result<Self, ProducerError> {
        info!(
            bootstrap_servers = %config.bootstrap_servers,
            stream = %config.stream_name,
            "Creating Kafka producer"
        );

        let producer: FutureProducer = config.build_producer_config().create()?;

        Ok(Self {
            producer,
            timeout: config.publish_timeout(),
        })
    }

    /// Flush all pending messages
    pub fn flush(&self, timeout: Duration) -> Result<(), KafkaError> {
        self.producer.flush(Timeout::After(timeout))
    }

    /// Number of messages waiting in the producer queue
    pub fn queue_len(&self) -> i32 {
        self.producer.in_flight_count()
    }
}

#[async_trait]
impl StreamPublisher for KafkaPublisher {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn publish_batch(
        &self,
        stream: &str,
        partition_key: &str,
        records: &[Bytes],
    ) -> Result<Vec<RecordOutcome>, PublishError> {
        let sends = records.iter().map(|payload| {
            let record = FutureRecord::to(stream)
                .key(partition_key)
                .payload(&payload[..]);
            self.producer.send(record, Timeout::After(self.timeout))
        });

        let results = tokio::time::timeout(self.timeout, futures::future::join_all(sends))
            .await
            .map_err(|_| PublishError::Timeout {
                stream: stream.to_string(),
                timeout: self.timeout,
            })?;

        let outcomes: Vec<_> = results
            .into_iter()
            .map(|result| delivery_outcome(stream, result.map_err(|(e, _)| e)))
            .collect();

        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Delivered { .. }))
            .count() as u64;
        metrics::counter!("replay.records.delivered").increment(delivered);
        metrics::counter!("replay.records.failed").increment(outcomes.len() as u64 - delivered);

        debug!(delivered, "Batch acknowledged");
        Ok(outcomes)
    }
}

impl Drop for KafkaPublisher {
    fn drop(&mut self) {
        info!("Shutting down Kafka producer");
        if let Err(e) = self.flush(Duration::from_secs(5)) {
            warn!(error = %e, "Failed to flush producer on shutdown");
        }
    }
}

/// Map one delivery report: offset becomes the sequence number and
/// `<topic>-<partition>` the shard id.
pub fn delivery_outcome(stream: &str, result: Result<(i32, i64), KafkaError>) -> RecordOutcome {
    match result {
        Ok((partition, offset)) => RecordOutcome::Delivered {
            sequence_number: offset.to_string(),
            shard_id: format!("{stream}-{partition}"),
        },
        Err(e) => RecordOutcome::Failed {
            error_code: error_code_name(&e),
            error_message: e.to_string(),
        },
    }
}

fn error_code_name(error: &KafkaError) -> String {
    match error.rdkafka_error_code() {
        Some(code) => format!("{code:?}"),
        None => "Unknown".to_string(),
    }
}
