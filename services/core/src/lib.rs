//! Telemetry Core
//!
//! Flattening and batching engine for namespace-qualified XML telemetry stored
//! in an object store. It provides:
//!
//! - **Record flattening**: schema-aware conversion of signal and component
//!   messages into flat records, failing loudly on unknown structure
//! - **Size-bounded partitioning**: greedy grouping of listed objects into
//!   batches under a byte ceiling
//! - **Timestamp coalescing**: grouping of sorted keys that share an embedded
//!   millisecond timestamp
//! - **Replay pacing**: timed emission of coalesced batches to a stream,
//!   reproducing the captured inter-arrival gaps
//!
//! ## Data flow
//!
//! ```text
//!                 ┌──────────────┐    ┌──────────┐    ┌──────────────┐
//! list objects ──▶│ Size         │───▶│ download │───▶│ Record       │──▶ table writer
//!                 │ Partitioner  │    └──────────┘    │ Flattener    │
//!                 └──────────────┘                    └──────────────┘
//!
//!                 ┌──────────────┐    ┌──────────┐    ┌──────────────┐
//! list keys ─────▶│ Timestamp    │───▶│ download │───▶│ Replay       │──▶ stream publish
//!                 │ Coalescer    │    └──────────┘    │ Pacer        │
//!                 └──────────────┘                    └──────────────┘
//! ```
//!
//! Object store and stream clients are passed in explicitly through the
//! [`ObjectStore`] and [`StreamPublisher`] traits.

pub mod coalesce;
pub mod flatten;
pub mod layout;
pub mod object_store;
pub mod partition;
pub mod projection;
pub mod replay;

pub use coalesce::{coalesce_by_timestamp, CoalesceError, TimestampBatch, TimestampCoalescer};
pub use flatten::{
    split_compacted, ComponentFlattener, FlatRecord, FlattenError, ReadingCategory,
    RecordFlattener, SignalFlattener, XmlMessage,
};
pub use layout::{flattened_key, key_timestamp, partition_prefix, DatePartition, KeyError};
pub use object_store::{
    fetch_all, FetchedObject, InMemoryObjectStore, ObjectStore, ObjectStoreError, S3Config,
    S3ObjectStore,
};
pub use partition::{
    partition_by_size, Batch, ObjectDescriptor, PartitionError, SizeBoundedPartitioner,
};
pub use projection::ColumnProjection;
pub use replay::{
    iter_source, wait_before, BatchSource, PacerState, PublishError, RecordOutcome, ReplayBatch,
    ReplayError, ReplayPacer, ReplayStats, Sleeper, StreamPublisher, TokioSleeper,
};
