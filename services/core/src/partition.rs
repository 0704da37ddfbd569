//! Greedy size-bounded batching of object descriptors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when configuring the partitioner
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Batch ceiling must be greater than 0 bytes")]
    ZeroCeiling,
}

/// A listed object: key plus size in bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub key: String,
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Non-empty run of descriptors with their summed size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub items: Vec<ObjectDescriptor>,
    pub size: u64,
}

impl Batch {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|d| d.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Groups descriptors into batches whose cumulative size stays under a ceiling.
///
/// The ceiling is advisory: an item that alone meets or exceeds it still
/// gets a batch of its own.
#[derive(Debug, Clone, Copy)]
pub struct SizeBoundedPartitioner {
    ceiling: u64,
}

impl SizeBoundedPartitioner {
    pub fn new(ceiling: u64) -> Result<Self, PartitionError> {
        if ceiling == 0 {
            return Err(PartitionError::ZeroCeiling);
        }
        Ok(Self { ceiling })
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Lazily partition `descriptors`, preserving their order
    pub fn partition<I>(&self, descriptors: I) -> PartitionBySize<I::IntoIter>
    where
        I: IntoIterator<Item = ObjectDescriptor>,
    {
        PartitionBySize {
            inner: descriptors.into_iter(),
            ceiling: self.ceiling,
            running: Vec::new(),
            running_size: 0,
        }
    }
}

/// Partition `descriptors` under `ceiling` bytes
pub fn partition_by_size<I>(
    descriptors: I,
    ceiling: u64,
) -> Result<PartitionBySize<I::IntoIter>, PartitionError>
where
    I: IntoIterator<Item = ObjectDescriptor>,
{
    Ok(SizeBoundedPartitioner::new(ceiling)?.partition(descriptors))
}

/// Iterator returned by [`partition_by_size`]
#[derive(Debug)]
pub struct PartitionBySize<I> {
    inner: I,
    ceiling: u64,
    running: Vec<ObjectDescriptor>,
    running_size: u64,
}

impl<I> PartitionBySize<I> {
    fn take_running(&mut self) -> Batch {
        Batch {
            items: std::mem::take(&mut self.running),
            size: std::mem::replace(&mut self.running_size, 0),
        }
    }
}

impl<I> Iterator for PartitionBySize<I>
where
    I: Iterator<Item = ObjectDescriptor>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        for descriptor in self.inner.by_ref() {
            let size = descriptor.size;

            if !self.running.is_empty()
                && self.running_size.saturating_add(size) >= self.ceiling
            {
                let batch = self.take_running();
                self.running.push(descriptor);
                self.running_size = size;
                return Some(batch);
            }

            self.running.push(descriptor);
            self.running_size = self.running_size.saturating_add(size);
        }

        if self.running.is_empty() {
            None
        } else {
            Some(self.take_running())
        }
    }
}
