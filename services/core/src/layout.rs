//! Object key layout: date partitions, output names and embedded timestamps.
//!
//! Raw objects live under
//! `{root}/{reading_type}/year=YYYY/month=MM/day=DD/{timestamp_ms}_{uuid}.xml`
//! and flattened outputs under the same partition path of another root.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised for malformed key names or partition values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Malformed key, no millisecond timestamp before '_' in file name: {0}")]
    MalformedKey(String),

    #[error("Invalid date partition: {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },
}

/// A validated `year/month/day` partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatePartition {
    year: i32,
    month: u32,
    day: u32,
}

impl DatePartition {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, KeyError> {
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(KeyError::InvalidDate { year, month, day });
        }
        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Hive-style path segment: `year=YYYY/month=MM/day=DD/`
    pub fn path_segment(&self) -> String {
        format!(
            "year={:04}/month={:02}/day={:02}/",
            self.year, self.month, self.day
        )
    }

    /// Compact form used in file names: `YYYYMMDD`
    pub fn compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for DatePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Prefix holding one reading type's objects for one day
pub fn partition_prefix(root: &str, reading_type: &str, date: &DatePartition) -> String {
    format!(
        "{}{}/{}",
        root_with_separator(root),
        reading_type,
        date.path_segment()
    )
}

/// Key of a flattened output file.
///
/// Format: `{root}/{reading_type}/year=YYYY/month=MM/day=DD/{reading_type}_{YYYYMMDD}_{rows}.{ext}`
pub fn flattened_key(
    root: &str,
    reading_type: &str,
    date: &DatePartition,
    row_count: usize,
    extension: &str,
) -> String {
    format!(
        "{prefix}{reading_type}_{date}_{rows}.{ext}",
        prefix = partition_prefix(root, reading_type, date),
        reading_type = reading_type,
        date = date.compact(),
        rows = row_count,
        ext = extension
    )
}

/// Millisecond timestamp embedded in a key's file name.
///
/// The file name is the last `/`-separated component; the timestamp is the
/// token before its first `_`.
pub fn key_timestamp(key: &str) -> Result<i64, KeyError> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let token = file_name.split('_').next().unwrap_or(file_name);

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::MalformedKey(key.to_string()));
    }

    token
        .parse::<i64>()
        .map_err(|_| KeyError::MalformedKey(key.to_string()))
}

fn root_with_separator(root: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        String::new()
    } else {
        format!("{root}/")
    }
}
