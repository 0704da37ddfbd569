//! XML Flattener
//!
//! Batch job turning one reading type's raw XML telemetry for one day into
//! flat tables. Compacted files are listed from the object store, grouped
//! into size-bounded batches, downloaded concurrently, flattened with the
//! schema matching the reading type and uploaded as one table per batch.
//!
//! ## Layout
//!
//! ```text
//! {source_root}/{TYPE}/year=YYYY/month=MM/day=DD/<compacted files>
//!                  │
//!                  ▼
//! {output_root}/{TYPE}/year=YYYY/month=MM/day=DD/{TYPE}_{YYYYMMDD}_{rows}.csv
//! ```

pub mod config;
pub mod job;
pub mod table;

pub use config::{
    Config, ConfigValidationError, JobConfig, JobTarget, LogFormat, OutputFormat,
    SchemaErrorPolicy, ServiceConfig,
};
pub use job::{FlattenJob, JobError, JobStats, JobSummary};
pub use table::FlatTable;
