//! Fixed-column projection of flattened records into delimited lines.

use crate::flatten::FlatRecord;

/// Envelope attributes leading every acoustic line
pub const ACOUSTIC_ATTRIBUTES: [&str; 6] = [
    "vehicleIdentifier",
    "componentIdentifier",
    "positionInTrain",
    "typeOfReading",
    "readingTimestampUTC",
    "readingLocation",
];

/// Acoustic bearing/wheel readings, in column order
pub const ACOUSTIC_READINGS: [&str; 22] = [
    "SensorDataQualityDescription",
    "SiteTimeZoneId",
    "SiteName",
    "TrainDirection",
    "VehicleTag",
    "VehicleEndLeading",
    "TrackSide",
    "TrainAxleNumber",
    "VehicleAxleNumber",
    "VehicleSide",
    "RailBAMBearingFaultCode",
    "RailBAMWheelFaultCode",
    "RMSTotalDB",
    "RMSBandDB",
    "LooseFrettingDB",
    "RollerDB",
    "CupDB",
    "ConeDB",
    "NoisyDB",
    "RMSBandWheelflatDB",
    "WheelflatDB",
    "TrainVehicleNumber",
];

/// Projects records onto a fixed list of columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProjection {
    columns: Vec<String>,
    delimiter: char,
}

impl ColumnProjection {
    pub fn new<I, S>(columns: I, delimiter: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            delimiter,
        }
    }

    /// Pipe-delimited projection of acoustic signal records
    pub fn acoustic() -> Self {
        Self::new(
            ACOUSTIC_ATTRIBUTES.iter().chain(ACOUSTIC_READINGS.iter()).copied(),
            '|',
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Render one line: every column value followed by the delimiter, then `\n`.
    ///
    /// Missing and null values render empty; fields outside the column list
    /// are ignored.
    pub fn render(&self, record: &FlatRecord) -> String {
        let mut line = String::new();
        for column in &self.columns {
            if let Some(Some(value)) = record.get(column) {
                line.push_str(value);
            }
            line.push(self.delimiter);
        }
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_missing_columns() {
        let projection = ColumnProjection::new(["a", "b", "c"], '|');
        let mut record = FlatRecord::new();
        record.set("c", Some("3".to_string()));
        record.set("a", Some("1".to_string()));
        record.set("ignored", Some("x".to_string()));

        assert_eq!(projection.render(&record), "1||3|\n");
    }

    #[test]
    fn test_acoustic_columns() {
        let projection = ColumnProjection::acoustic();
        assert_eq!(projection.columns().len(), 28);
        assert_eq!(projection.columns()[0], "vehicleIdentifier");
        assert_eq!(projection.columns()[27], "TrainVehicleNumber");
        assert_eq!(projection.render(&FlatRecord::new()), format!("{}\n", "|".repeat(28)));
    }
}
