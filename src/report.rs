//! The final report: the only artifact a run exports. One JSON document with
//! the aggregate outcome plus the full day-by-day history, and a CSV view of
//! the history for charting.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use serde::{Deserialize, Serialize};

use crate::city::Statistics;
use crate::error::OutbreakError;

/// One per-day aggregate snapshot, appended to the history every tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub day: u32,
    pub statistics: Statistics,
}

/// The report generated when a run ends, however it ends.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalReport {
    pub duration_days: u32,
    pub final_statistics: Statistics,
    pub peak_infections: u64,
    pub peak_infection_day: u32,
    /// Human-readable description of which termination rule fired.
    pub end_reason: String,
    pub history: Vec<DayRecord>,
}

// Flattened history row; the csv crate does not serialize nested structs.
#[derive(Serialize)]
struct HistoryRow {
    day: u32,
    total_population: u64,
    infected: u64,
    deceased: u64,
    recovered: u64,
    susceptible: u64,
}

impl From<&DayRecord> for HistoryRow {
    fn from(record: &DayRecord) -> Self {
        HistoryRow {
            day: record.day,
            total_population: record.statistics.total_population,
            infected: record.statistics.infected,
            deceased: record.statistics.deceased,
            recovered: record.statistics.recovered,
            susceptible: record.statistics.susceptible,
        }
    }
}

// Checks the extension and creates parent directories, returning the opened
// file.
fn create_output_file(path: &Path, extension: &str) -> Result<File, OutbreakError> {
    if path.extension().and_then(OsStr::to_str) != Some(extension) {
        return Err(OutbreakError::OutbreakError(format!(
            "report output file {} must have a .{extension} extension",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

impl FinalReport {
    /// Writes the whole report as a pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has the wrong extension or the file
    /// cannot be written.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), OutbreakError> {
        let file = create_output_file(path.as_ref(), "json")?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Writes the day-by-day history as CSV, one row per simulated day.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has the wrong extension or the file
    /// cannot be written.
    pub fn write_history_csv(&self, path: impl AsRef<Path>) -> Result<(), OutbreakError> {
        let file = create_output_file(path.as_ref(), "csv")?;
        let mut writer = Writer::from_writer(file);
        for record in &self.history {
            writer.serialize(HistoryRow::from(record))?;
        }
        writer.flush().map_err(OutbreakError::IoError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_report() -> FinalReport {
        let day = |day, infected| DayRecord {
            day,
            statistics: Statistics {
                total_population: 1000,
                infected,
                deceased: 1,
                recovered: 10,
                susceptible: 1000 - infected - 11,
            },
        };
        FinalReport {
            duration_days: 2,
            final_statistics: day(2, 5).statistics,
            peak_infections: 40,
            peak_infection_day: 1,
            end_reason: "Near-zero infections for 7 days after peak of 40 on day 1".to_string(),
            history: vec![day(1, 40), day(2, 5)],
        }
    }

    #[test]
    fn json_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample_report();
        report.write_json(&path).unwrap();

        let read: FinalReport =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(read.duration_days, 2);
        assert_eq!(read.peak_infections, 40);
        assert_eq!(read.history, report.history);
    }

    #[test]
    fn csv_has_one_row_per_day() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        sample_report().write_history_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "1");
        assert_eq!(&rows[0][2], "40");
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let report = sample_report();
        assert!(report.write_json(dir.path().join("report.txt")).is_err());
        assert!(report
            .write_history_csv(dir.path().join("history.tsv"))
            .is_err());
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs").join("7").join("report.json");
        sample_report().write_json(&path).unwrap();
        assert!(path.exists());
    }
}
