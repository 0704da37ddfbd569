//! One flattening run: list a day partition, batch it by size, download,
//! flatten and upload one table per batch.

use crate::config::{JobConfig, JobTarget, OutputFormat, SchemaErrorPolicy};
use crate::table::FlatTable;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use telemetry_core::{
    fetch_all, flattened_key, partition_by_size, partition_prefix, Batch, ColumnProjection,
    FlatRecord, FlattenError, ObjectStore, ObjectStoreError, PartitionError, RecordFlattener,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Errors that abort a flattening run
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to list {prefix}: {source}")]
    Listing {
        prefix: String,
        #[source]
        source: ObjectStoreError,
    },

    #[error("Schema violation in {key}: {source}")]
    Schema {
        key: String,
        #[source]
        source: FlattenError,
    },

    #[error("Object {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },

    #[error("Failed to encode table: {0}")]
    Encode(#[from] csv::Error),

    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// Counters for a run, updated as batches complete
#[derive(Debug, Default)]
pub struct JobStats {
    batches: AtomicU64,
    objects_downloaded: AtomicU64,
    downloads_failed: AtomicU64,
    messages: AtomicU64,
    messages_skipped: AtomicU64,
    rows_uploaded: AtomicU64,
    uploads_failed: AtomicU64,
}

impl JobStats {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JobSummary {
        JobSummary {
            batches: self.batches.load(Ordering::Relaxed),
            objects_downloaded: self.objects_downloaded.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            messages_skipped: self.messages_skipped.load(Ordering::Relaxed),
            rows_uploaded: self.rows_uploaded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            uploaded_keys: Vec::new(),
        }
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub batches: u64,
    pub objects_downloaded: u64,
    pub downloads_failed: u64,
    pub messages: u64,
    pub messages_skipped: u64,
    pub rows_uploaded: u64,
    pub uploads_failed: u64,
    /// Keys of the uploaded tables, in batch order
    pub uploaded_keys: Vec<String>,
}

/// Flattens one reading type and day
pub struct FlattenJob {
    store: Arc<dyn ObjectStore>,
    config: JobConfig,
    target: JobTarget,
    flattener: RecordFlattener,
    stats: JobStats,
}

impl FlattenJob {
    pub fn new(store: Arc<dyn ObjectStore>, config: JobConfig, target: JobTarget) -> Self {
        let flattener = RecordFlattener::for_category(config.category(&target.reading_type));

        Self {
            store,
            config,
            target,
            flattener,
            stats: JobStats::default(),
        }
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    /// Run the job to completion.
    ///
    /// Download and upload failures are logged and counted. Schema
    /// violations abort the run unless the policy is `skip`.
    #[instrument(skip(self), fields(reading_type = %self.target.reading_type, date = %self.target.date))]
    pub async fn run(&self) -> Result<JobSummary, JobError> {
        let prefix = partition_prefix(
            &self.config.source_root,
            &self.target.reading_type,
            &self.target.date,
        );

        info!(
            bucket = %self.store.bucket(),
            prefix = %prefix,
            category = ?self.flattener.category(),
            "Flattening files"
        );

        let listed = self
            .store
            .list(&prefix)
            .await
            .map_err(|source| JobError::Listing {
                prefix: prefix.clone(),
                source,
            })?;

        if listed.is_empty() {
            warn!(prefix = %prefix, "No objects found");
        }

        let mut uploaded_keys = Vec::new();
        for batch in partition_by_size(listed, self.config.max_batch_bytes)? {
            if let Some(key) = self.process_batch(batch).await? {
                uploaded_keys.push(key);
            }
        }

        let mut summary = self.stats.snapshot();
        summary.uploaded_keys = uploaded_keys;
        Ok(summary)
    }

    #[instrument(skip(self, batch), fields(objects = batch.len(), size_bytes = batch.size))]
    async fn process_batch(&self, batch: Batch) -> Result<Option<String>, JobError> {
        JobStats::add(&self.stats.batches, 1);
        info!("Flattening xml files");

        let keys = batch.keys().map(str::to_string).collect();
        let mut fetched = fetch_all(
            self.store.as_ref(),
            keys,
            self.config.download_concurrency,
        )
        .await;
        fetched.sort_by_key(|object| object.index);

        let mut records = Vec::new();
        for object in fetched {
            match object.result {
                Ok(content) => {
                    JobStats::add(&self.stats.objects_downloaded, 1);
                    metrics::counter!("flattener.objects.downloaded").increment(1);
                    records.extend(self.flatten_object(&object.key, &content)?);
                }
                Err(e) => {
                    error!(key = %object.key, error = %e, "Failed to download object");
                    JobStats::add(&self.stats.downloads_failed, 1);
                    metrics::counter!("flattener.objects.failed").increment(1);
                }
            }
        }

        let table = FlatTable::from_records(records);
        if table.is_empty() {
            warn!("Batch produced no rows, nothing to upload");
            return Ok(None);
        }

        let format = self.config.output_format;
        let body = match format {
            OutputFormat::Csv => table.to_csv()?,
            OutputFormat::Delimited => table.to_delimited(&ColumnProjection::acoustic()),
        };

        let key = flattened_key(
            &self.config.output_root,
            &self.target.reading_type,
            &self.target.date,
            table.row_count(),
            format.extension(),
        );

        info!(key = %key, rows = table.row_count(), columns = table.columns().len(), "Saving file");

        match self.store.put(&key, body, format.content_type()).await {
            Ok(()) => {
                let rows = table.row_count() as u64;
                JobStats::add(&self.stats.rows_uploaded, rows);
                metrics::counter!("flattener.rows.uploaded").increment(rows);
                info!(key = %key, "File saved successfully");
                Ok(Some(key))
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to save file");
                JobStats::add(&self.stats.uploads_failed, 1);
                metrics::counter!("flattener.uploads.failed").increment(1);
                Ok(None)
            }
        }
    }

    fn flatten_object(&self, key: &str, content: &[u8]) -> Result<Vec<FlatRecord>, JobError> {
        let content = match std::str::from_utf8(content) {
            Ok(content) => content,
            Err(_) => {
                self.reject_message(JobError::InvalidUtf8 {
                    key: key.to_string(),
                })?;
                return Ok(Vec::new());
            }
        };

        let mut records = Vec::new();
        for message in self.flattener.split_compacted(content) {
            JobStats::add(&self.stats.messages, 1);
            match self.flattener.flatten(&message) {
                Ok(rows) => {
                    metrics::counter!("flattener.messages.flattened").increment(1);
                    records.extend(rows);
                }
                Err(source) => self.reject_message(JobError::Schema {
                    key: key.to_string(),
                    source,
                })?,
            }
        }

        Ok(records)
    }

    fn reject_message(&self, error: JobError) -> Result<(), JobError> {
        match self.config.on_schema_error {
            SchemaErrorPolicy::Halt => Err(error),
            SchemaErrorPolicy::Skip => {
                warn!(error = %error, "Skipping malformed message");
                JobStats::add(&self.stats.messages_skipped, 1);
                metrics::counter!("flattener.messages.skipped").increment(1);
                Ok(())
            }
        }
    }
}
