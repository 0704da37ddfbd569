//! Grouping of sorted keys into batches that share an embedded timestamp.

use crate::layout::{key_timestamp, KeyError};
use thiserror::Error;
use tracing::trace;

/// Errors raised while coalescing keys
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoalesceError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Key {key} has timestamp {timestamp_ms} earlier than the current batch at {current_ms}; keys must be sorted by timestamp")]
    OutOfOrder {
        key: String,
        timestamp_ms: i64,
        current_ms: i64,
    },
}

/// Keys sharing one embedded millisecond timestamp, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampBatch {
    pub timestamp_ms: i64,
    pub keys: Vec<String>,
}

/// Push-based run-length grouping of keys by embedded timestamp.
///
/// Input keys must be sorted so that equal timestamps are contiguous and
/// timestamps never decrease. A decreasing timestamp is rejected rather than
/// fragmenting a logical batch.
#[derive(Debug, Default)]
pub struct TimestampCoalescer {
    current: Option<TimestampBatch>,
}

impl TimestampCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next key; returns the previous batch once a new timestamp starts
    pub fn push(&mut self, key: impl Into<String>) -> Result<Option<TimestampBatch>, CoalesceError> {
        let key = key.into();
        let timestamp_ms = key_timestamp(&key)?;

        match self.current_timestamp() {
            Some(current_ms) if current_ms == timestamp_ms => {
                if let Some(batch) = self.current.as_mut() {
                    batch.keys.push(key);
                }
                Ok(None)
            }
            Some(current_ms) if timestamp_ms < current_ms => Err(CoalesceError::OutOfOrder {
                key,
                timestamp_ms,
                current_ms,
            }),
            _ => {
                let finished = self.current.replace(TimestampBatch {
                    timestamp_ms,
                    keys: vec![key],
                });
                if let Some(ref batch) = finished {
                    trace!(
                        timestamp_ms = batch.timestamp_ms,
                        keys = batch.keys.len(),
                        "Coalesced batch"
                    );
                }
                Ok(finished)
            }
        }
    }

    /// Emit the batch in progress, leaving the coalescer empty
    pub fn finish(&mut self) -> Option<TimestampBatch> {
        self.current.take()
    }

    /// Timestamp of the batch in progress
    pub fn current_timestamp(&self) -> Option<i64> {
        self.current.as_ref().map(|b| b.timestamp_ms)
    }
}

/// Lazily coalesce `keys` into timestamp batches
pub fn coalesce_by_timestamp<I>(keys: I) -> CoalesceByTimestamp<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    CoalesceByTimestamp {
        keys: keys.into_iter(),
        coalescer: TimestampCoalescer::new(),
        failed: false,
    }
}

/// Iterator returned by [`coalesce_by_timestamp`]
#[derive(Debug)]
pub struct CoalesceByTimestamp<I> {
    keys: I,
    coalescer: TimestampCoalescer,
    failed: bool,
}

impl<I> Iterator for CoalesceByTimestamp<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    type Item = Result<TimestampBatch, CoalesceError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop after the first error
        if self.failed {
            return None;
        }

        for key in self.keys.by_ref() {
            match self.coalescer.push(key) {
                Ok(Some(batch)) => return Some(Ok(batch)),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        self.coalescer.finish().map(Ok)
    }
}
