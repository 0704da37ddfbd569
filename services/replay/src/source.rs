//! Object-store backed [`BatchSource`].
//!
//! Walks the configured day partitions in order, coalescing each day's sorted
//! keys by embedded timestamp and downloading one batch at a time. With
//! cycling enabled the day list restarts forever; the coalescer is flushed
//! at every wrap so the timestamp reset starts a fresh group.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use telemetry_core::{
    fetch_all, partition_prefix, BatchSource, DatePartition, ObjectStore, ReplayBatch,
    ReplayError, TimestampBatch, TimestampCoalescer,
};
use tracing::{error, info, instrument, warn};

/// Where and how to read the captured messages
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub source_root: String,
    pub reading_type: String,
    pub days: Vec<DatePartition>,
    pub cycle: bool,
    pub download_concurrency: usize,
}

pub struct S3ReplaySource {
    store: Arc<dyn ObjectStore>,
    settings: SourceSettings,
    coalescer: TimestampCoalescer,
    pending: VecDeque<TimestampBatch>,
    next_day: usize,
    batches_this_cycle: u64,
    exhausted: bool,
}

impl S3ReplaySource {
    pub fn new(store: Arc<dyn ObjectStore>, settings: SourceSettings) -> Self {
        Self {
            store,
            settings,
            coalescer: TimestampCoalescer::new(),
            pending: VecDeque::new(),
            next_day: 0,
            batches_this_cycle: 0,
            exhausted: false,
        }
    }

    /// Coalesce the next day partition, or handle the end of the day list
    async fn advance(&mut self) -> Result<(), ReplayError> {
        if self.next_day >= self.settings.days.len() {
            if let Some(batch) = self.coalescer.finish() {
                self.enqueue(batch);
            }

            if !self.settings.cycle {
                self.exhausted = true;
            } else if self.batches_this_cycle == 0 {
                warn!("No objects found in any configured day, stopping");
                self.exhausted = true;
            } else {
                info!(reading_type = %self.settings.reading_type, "Restarting day cycle");
                self.next_day = 0;
                self.batches_this_cycle = 0;
            }
            return Ok(());
        }

        let date = self.settings.days[self.next_day];
        self.next_day += 1;
        self.load_day(&date).await
    }

    #[instrument(skip(self), fields(reading_type = %self.settings.reading_type))]
    async fn load_day(&mut self, date: &DatePartition) -> Result<(), ReplayError> {
        let prefix = partition_prefix(&self.settings.source_root, &self.settings.reading_type, date);

        let mut keys: Vec<String> = self
            .store
            .list(&prefix)
            .await
            .map_err(|source| ReplayError::Listing {
                prefix: prefix.clone(),
                source,
            })?
            .into_iter()
            .map(|object| object.key)
            .collect();
        keys.sort();

        info!(prefix = %prefix, keys = keys.len(), "Listed day partition");

        for key in keys {
            if let Some(batch) = self.coalescer.push(key)? {
                self.enqueue(batch);
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, batch: TimestampBatch) {
        self.batches_this_cycle += 1;
        self.pending.push_back(batch);
    }

    /// Download a batch's objects in batch order, dropping failed downloads
    async fn download(&self, batch: TimestampBatch) -> ReplayBatch {
        let mut fetched = fetch_all(
            self.store.as_ref(),
            batch.keys,
            self.settings.download_concurrency,
        )
        .await;
        fetched.sort_by_key(|object| object.index);

        let mut records = Vec::with_capacity(fetched.len());
        for object in fetched {
            match object.result {
                Ok(data) => records.push(data),
                Err(e) => {
                    error!(key = %object.key, error = %e, "Failed to download object");
                    metrics::counter!("replay.objects.failed").increment(1);
                }
            }
        }
        metrics::counter!("replay.objects.downloaded").increment(records.len() as u64);

        ReplayBatch {
            timestamp_ms: batch.timestamp_ms,
            records,
        }
    }
}

#[async_trait]
impl BatchSource for S3ReplaySource {
    async fn next_batch(&mut self) -> Result<Option<ReplayBatch>, ReplayError> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Ok(Some(self.download(batch).await));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.advance().await?;
        }
    }
}
