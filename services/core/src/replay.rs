//! Timed replay of captured batches to a stream.
//!
//! The pacer waits between batches so that the wall-clock gap matches the gap
//! between their embedded timestamps, then hands each batch to a
//! [`StreamPublisher`].
//!
//! ```text
//! INIT ──▶ WAITING ──▶ PUBLISHING ──┐
//!             ▲                     │
//!             └─────────────────────┘
//!                   (source exhausted) ──▶ DONE
//! ```

use crate::coalesce::CoalesceError;
use crate::object_store::ObjectStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Per-record result of a batch publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Delivered {
        sequence_number: String,
        shard_id: String,
    },
    Failed {
        error_code: String,
        error_message: String,
    },
}

/// Failure of a publish call as a whole
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publishing to {stream} timed out after {timeout:?}")]
    Timeout { stream: String, timeout: Duration },

    #[error("Publishing to {stream} failed: {message}")]
    Rejected { stream: String, message: String },
}

/// Stream sink receiving whole batches
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Publish `records` under one partition key, reporting each record's outcome
    async fn publish_batch(
        &self,
        stream: &str,
        partition_key: &str,
        records: &[Bytes],
    ) -> Result<Vec<RecordOutcome>, PublishError>;
}

/// Suspends the pacer between batches
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records captured at one millisecond timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayBatch {
    pub timestamp_ms: i64,
    pub records: Vec<Bytes>,
}

/// Errors that end a replay run
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Coalesce(#[from] CoalesceError),

    #[error("Failed to list {prefix}: {source}")]
    Listing {
        prefix: String,
        #[source]
        source: ObjectStoreError,
    },
}

/// Producer of replay batches in emission order
#[async_trait]
pub trait BatchSource: Send {
    /// Next batch, or `None` once the source is exhausted
    async fn next_batch(&mut self) -> Result<Option<ReplayBatch>, ReplayError>;
}

/// [`BatchSource`] over an in-memory iterator
#[derive(Debug)]
pub struct IterSource<I>(I);

/// Wrap an iterator of batches as a [`BatchSource`]
pub fn iter_source<I>(batches: I) -> IterSource<I::IntoIter>
where
    I: IntoIterator<Item = ReplayBatch>,
{
    IterSource(batches.into_iter())
}

#[async_trait]
impl<I> BatchSource for IterSource<I>
where
    I: Iterator<Item = ReplayBatch> + Send,
{
    async fn next_batch(&mut self) -> Result<Option<ReplayBatch>, ReplayError> {
        Ok(self.0.next())
    }
}

/// Pacer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    Init,
    Waiting,
    Publishing,
    Done,
}

/// Counters accumulated over one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub batches_published: u64,
    pub batches_failed: u64,
    pub batches_skipped: u64,
    pub records_delivered: u64,
    pub records_failed: u64,
}

/// Wait before publishing a batch at `timestamp_ms` after one at `last_ms`.
///
/// The first batch and out-of-order batches are not delayed.
pub fn wait_before(last_ms: Option<i64>, timestamp_ms: i64) -> Duration {
    match last_ms {
        Some(last) if last < timestamp_ms => Duration::from_millis(timestamp_ms.abs_diff(last)),
        _ => Duration::ZERO,
    }
}

/// Drives timed emission of batches to a stream
pub struct ReplayPacer<P, S = TokioSleeper> {
    publisher: P,
    sleeper: S,
    stream_name: String,
    partition_key: String,
    state: PacerState,
    last_timestamp_ms: Option<i64>,
}

impl<P> ReplayPacer<P, TokioSleeper>
where
    P: StreamPublisher,
{
    /// Create a pacer that sleeps on the tokio timer
    pub fn new(
        publisher: P,
        stream_name: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self::with_sleeper(publisher, TokioSleeper, stream_name, partition_key)
    }
}

impl<P, S> ReplayPacer<P, S>
where
    P: StreamPublisher,
    S: Sleeper,
{
    /// Create a pacer with a custom sleeper
    pub fn with_sleeper(
        publisher: P,
        sleeper: S,
        stream_name: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            sleeper,
            stream_name: stream_name.into(),
            partition_key: partition_key.into(),
            state: PacerState::Init,
            last_timestamp_ms: None,
        }
    }

    pub fn state(&self) -> PacerState {
        self.state
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Replay every batch of `source`, blocking until it is exhausted.
    ///
    /// Publish failures are logged and counted; only a source error ends the
    /// run early.
    pub async fn run<B>(&mut self, source: &mut B) -> Result<ReplayStats, ReplayError>
    where
        B: BatchSource + ?Sized,
    {
        info!(
            stream = %self.stream_name,
            partition_key = %self.partition_key,
            "Starting replay"
        );

        let mut stats = ReplayStats::default();

        loop {
            let batch = match source.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    self.state = PacerState::Done;
                    error!(error = %e, "Replay source failed");
                    return Err(e);
                }
            };

            self.state = PacerState::Waiting;
            let wait = wait_before(self.last_timestamp_ms, batch.timestamp_ms);
            info!(
                timestamp_ms = batch.timestamp_ms,
                wait_secs = wait.as_secs_f64(),
                "Waiting before producing next batch"
            );
            self.sleeper.sleep(wait).await;

            self.state = PacerState::Publishing;
            self.publish(&batch, &mut stats).await;
            self.last_timestamp_ms = Some(batch.timestamp_ms);
        }

        self.state = PacerState::Done;
        info!(
            batches_published = stats.batches_published,
            batches_failed = stats.batches_failed,
            records_delivered = stats.records_delivered,
            records_failed = stats.records_failed,
            "Replay finished"
        );

        Ok(stats)
    }

    async fn publish(&self, batch: &ReplayBatch, stats: &mut ReplayStats) {
        if batch.records.is_empty() {
            warn!(
                timestamp_ms = batch.timestamp_ms,
                "Skipping batch with no records"
            );
            stats.batches_skipped += 1;
            return;
        }

        info!(
            timestamp_ms = batch.timestamp_ms,
            records = batch.records.len(),
            "Sending records to stream"
        );

        let outcomes = match self
            .publisher
            .publish_batch(&self.stream_name, &self.partition_key, &batch.records)
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(
                    error = %e,
                    timestamp_ms = batch.timestamp_ms,
                    record = %render_payload(&batch.records),
                    "Error producing batch"
                );
                stats.batches_failed += 1;
                return;
            }
        };

        stats.batches_published += 1;
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Delivered {
                    sequence_number,
                    shard_id,
                } => {
                    debug!(
                        sequence_number = %sequence_number,
                        shard_id = %shard_id,
                        "Produced record"
                    );
                    stats.records_delivered += 1;
                }
                RecordOutcome::Failed {
                    error_code,
                    error_message,
                } => {
                    error!(
                        error_code = %error_code,
                        error_message = %error_message,
                        "Failed to produce record"
                    );
                    stats.records_failed += 1;
                }
            }
        }
    }
}

fn render_payload(records: &[Bytes]) -> String {
    records
        .iter()
        .map(|r| String::from_utf8_lossy(r).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Sleep(Duration),
        Publish(usize),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
        fail_calls: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Sleeper for Recorder {
        async fn sleep(&self, duration: Duration) {
            self.events.lock().push(Event::Sleep(duration));
        }
    }

    #[async_trait]
    impl StreamPublisher for Recorder {
        async fn publish_batch(
            &self,
            stream: &str,
            _partition_key: &str,
            records: &[Bytes],
        ) -> Result<Vec<RecordOutcome>, PublishError> {
            let call = {
                let mut events = self.events.lock();
                events.push(Event::Publish(records.len()));
                events.iter().filter(|e| matches!(e, Event::Publish(_))).count()
            };

            if self.fail_calls.lock().contains(&call) {
                return Err(PublishError::Rejected {
                    stream: stream.to_string(),
                    message: "throttled".to_string(),
                });
            }

            Ok(records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    if record.as_ref() == b"bad" {
                        RecordOutcome::Failed {
                            error_code: "ProvisionedThroughputExceededException".to_string(),
                            error_message: "Rate exceeded".to_string(),
                        }
                    } else {
                        RecordOutcome::Delivered {
                            sequence_number: format!("{call}{i}"),
                            shard_id: "shardId-000000000000".to_string(),
                        }
                    }
                })
                .collect())
        }
    }

    fn batch(timestamp_ms: i64, records: &[&'static str]) -> ReplayBatch {
        ReplayBatch {
            timestamp_ms,
            records: records.iter().map(|r| Bytes::from_static(r.as_bytes())).collect(),
        }
    }

    #[test]
    fn test_wait_before() {
        assert_eq!(wait_before(None, 1000), Duration::ZERO);
        assert_eq!(wait_before(Some(1000), 1500), Duration::from_millis(500));
        assert_eq!(wait_before(Some(1500), 1500), Duration::ZERO);
        assert_eq!(wait_before(Some(3000), 1000), Duration::ZERO);

        // Gaps wider than i64::MAX still come out exact
        assert_eq!(
            wait_before(Some(i64::MIN), i64::MAX),
            Duration::from_millis(u64::MAX)
        );
        assert_eq!(wait_before(Some(-500), 250), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_waits_match_timestamp_gaps() {
        let recorder = Recorder::default();
        let mut pacer =
            ReplayPacer::with_sleeper(recorder.clone(), recorder.clone(), "telemetry", "ACOUSTIC");
        let mut source = iter_source(vec![
            batch(1000, &["a"]),
            batch(1500, &["b", "c"]),
            batch(1500, &["d"]),
            batch(3000, &["e"]),
        ]);

        let stats = pacer.run(&mut source).await.unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec![
                Event::Sleep(Duration::ZERO),
                Event::Publish(1),
                Event::Sleep(Duration::from_millis(500)),
                Event::Publish(2),
                Event::Sleep(Duration::ZERO),
                Event::Publish(1),
                Event::Sleep(Duration::from_millis(1500)),
                Event::Publish(1),
            ]
        );
        assert_eq!(stats.batches_published, 4);
        assert_eq!(stats.records_delivered, 5);
        assert_eq!(pacer.state(), PacerState::Done);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_replay() {
        let recorder = Recorder::default();
        recorder.fail_calls.lock().push(1);
        let mut pacer =
            ReplayPacer::with_sleeper(recorder.clone(), recorder.clone(), "telemetry", "ACOUSTIC");
        let mut source = iter_source(vec![batch(1000, &["a"]), batch(2000, &["b"])]);

        let stats = pacer.run(&mut source).await.unwrap();

        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_published, 1);
        // The failed batch still advances the cadence
        assert!(recorder
            .events
            .lock()
            .contains(&Event::Sleep(Duration::from_millis(1000))));
    }

    #[tokio::test]
    async fn test_per_record_failures_counted() {
        let recorder = Recorder::default();
        let mut pacer =
            ReplayPacer::with_sleeper(recorder.clone(), recorder.clone(), "telemetry", "ACOUSTIC");
        let mut source = iter_source(vec![batch(1000, &["a", "bad", "c"])]);

        let stats = pacer.run(&mut source).await.unwrap();

        assert_eq!(stats.records_delivered, 2);
        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.batches_failed, 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skipped() {
        let recorder = Recorder::default();
        let mut pacer =
            ReplayPacer::with_sleeper(recorder.clone(), recorder.clone(), "telemetry", "ACOUSTIC");
        let mut source = iter_source(vec![batch(1000, &[])]);

        let stats = pacer.run(&mut source).await.unwrap();

        assert_eq!(stats.batches_skipped, 1);
        assert!(!recorder
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, Event::Publish(_))));
    }

    #[tokio::test]
    async fn test_source_error_ends_run() {
        struct Broken;

        #[async_trait]
        impl BatchSource for Broken {
            async fn next_batch(&mut self) -> Result<Option<ReplayBatch>, ReplayError> {
                Err(ReplayError::Coalesce(CoalesceError::Key(
                    crate::layout::KeyError::MalformedKey("x.xml".to_string()),
                )))
            }
        }

        let recorder = Recorder::default();
        let mut pacer =
            ReplayPacer::with_sleeper(recorder.clone(), recorder.clone(), "telemetry", "ACOUSTIC");

        assert!(pacer.run(&mut Broken).await.is_err());
        assert_eq!(pacer.state(), PacerState::Done);
    }
}
