//! CSV file data adapter.
//!
//! Files carry a header row followed by `date,open,high,low,close,volume`
//! records with ISO dates.

use crate::domain::error::PineError;
use crate::domain::ohlcv::{Dataset, OhlcvBar};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    /// Relative sources resolve against `base_path`; absolute ones are used as given.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, source: &str) -> PathBuf {
        self.base_path.join(source)
    }
}

impl Default for CsvAdapter {
    fn default() -> Self {
        Self::new(".")
    }
}

impl DataPort for CsvAdapter {
    fn load(&self, source: &str) -> Result<Dataset, PineError> {
        let path = self.csv_path(source);
        let content = fs::read_to_string(&path).map_err(|e| PineError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let dataset = parse_csv(&content)?;
        tracing::debug!(path = %path.display(), bars = dataset.len(), "loaded dataset");
        Ok(dataset)
    }
}

fn field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    row: usize,
) -> Result<T, PineError>
where
    T::Err: std::fmt::Display,
{
    record
        .get(index)
        .ok_or_else(|| PineError::Data {
            reason: format!("row {}: missing {} column", row, name),
        })?
        .trim()
        .parse()
        .map_err(|e| PineError::Data {
            reason: format!("row {}: invalid {} value: {}", row, name, e),
        })
}

/// Parse CSV text into a dataset. Rows may arrive in any date order.
pub fn parse_csv(content: &str) -> Result<Dataset, PineError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let row = i + 2;
        let record = result.map_err(|e| PineError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;

        let date_str = record.get(0).ok_or_else(|| PineError::Data {
            reason: format!("row {}: missing date column", row),
        })?;
        let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
            PineError::Data {
                reason: format!("row {}: invalid date format: {}", row, e),
            }
        })?;

        bars.push(OhlcvBar {
            date,
            open: field(&record, 1, "open", row)?,
            high: field(&record, 2, "high", row)?,
            low: field(&record, 3, "low", row)?,
            close: field(&record, 4, "close", row)?,
            volume: field(&record, 5, "volume", row)?,
        });
    }

    Ok(Dataset::new(bars))
}

/// Convenience for callers holding a path rather than an adapter.
pub fn load_csv(path: &Path) -> Result<Dataset, PineError> {
    CsvAdapter::new("").load(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::PriceField;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n";

        fs::write(path.join("BHP.csv"), csv_content).unwrap();
        fs::write(path.join("EMPTY.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(
            path.join("BAD.csv"),
            "date,open,high,low,close,volume\n2024-01-15,abc,1,1,1,1\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn load_returns_sorted_bars() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let dataset = adapter.load("BHP.csv").unwrap();

        assert_eq!(dataset.len(), 3);
        let first = &dataset.bars()[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 110.0);
        assert_eq!(first.low, 90.0);
        assert_eq!(first.close, 105.0);
        assert_eq!(first.volume, 50000.0);
        assert_eq!(dataset.column(PriceField::Close), vec![105.0, 110.0, 115.0]);
    }

    #[test]
    fn header_only_file_is_empty() {
        let (_dir, path) = setup_test_data();
        let dataset = CsvAdapter::new(path).load("EMPTY.csv").unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn load_fails_for_missing_file() {
        let (_dir, path) = setup_test_data();
        let result = CsvAdapter::new(path).load("XYZ.csv");
        assert!(matches!(result, Err(PineError::Data { .. })));
    }

    #[test]
    fn invalid_value_names_row_and_column() {
        let (_dir, path) = setup_test_data();
        let err = CsvAdapter::new(path).load("BAD.csv").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 2"), "{msg}");
        assert!(msg.contains("open"), "{msg}");
    }

    #[test]
    fn load_csv_accepts_absolute_path() {
        let (_dir, path) = setup_test_data();
        let dataset = load_csv(&path.join("BHP.csv")).unwrap();
        assert_eq!(dataset.len(), 3);
    }
}
