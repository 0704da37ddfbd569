//! Tabular output for flattened records.

use csv::{QuoteStyle, WriterBuilder};
use telemetry_core::{ColumnProjection, FlatRecord};

/// Flattened records sharing the union of their columns
#[derive(Debug, Clone, Default)]
pub struct FlatTable {
    columns: Vec<String>,
    rows: Vec<FlatRecord>,
}

impl FlatTable {
    /// Build a table whose columns are every record key, in first-seen order
    pub fn from_records(rows: Vec<FlatRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header plus one line per row, every field quoted.
    ///
    /// Columns a row lacks, and null values, are written as `""`.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(
                self.columns
                    .iter()
                    .map(|column| row.get(column).flatten().unwrap_or("")),
            )?;
        }

        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    /// One projected line per row, no header
    pub fn to_delimited(&self, projection: &ColumnProjection) -> Vec<u8> {
        self.rows
            .iter()
            .map(|row| projection.render(row))
            .collect::<String>()
            .into_bytes()
    }
}
