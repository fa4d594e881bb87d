use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use lc_types::{DataError, Dataset, LcResult};

/// CSV reader/writer for time-indexed load data.
///
/// The first header that looks like a timestamp (`timestamp`, `date`,
/// `datetime`, `time`, `index`) becomes the time index; every other column is
/// parsed as `f64`, with empty cells and `nan`/`NA` read as missing.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    delimiter: u8,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn load<P: AsRef<Path>>(&self, file_path: P) -> LcResult<Dataset> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV data from: {}", path.display());

        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();
        tracing::debug!("CSV headers: {:?}", headers);

        let timestamp_idx = Self::detect_timestamp_column(&headers);
        let value_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != timestamp_idx)
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut index = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_columns.len()];

        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line_num + 2, e),
            })?;

            match Self::parse_record(&record, timestamp_idx, &value_columns) {
                Ok((timestamp, row)) => {
                    index.push(timestamp);
                    for (column, value) in values.iter_mut().zip(row) {
                        column.push(value);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping invalid record at line {}: {}", line_num + 2, e);
                    continue;
                }
            }
        }

        let columns = value_columns
            .into_iter()
            .map(|(_, name)| name)
            .zip(values)
            .collect();
        let dataset = Dataset::from_columns(index, columns)?;

        tracing::info!(
            "Loaded {} rows x {} columns from CSV file",
            dataset.len(),
            dataset.num_columns()
        );
        Ok(dataset)
    }

    /// Write `dataset` with a leading RFC 3339 `timestamp` column.
    pub fn write<P: AsRef<Path>>(&self, dataset: &Dataset, file_path: P) -> LcResult<()> {
        let path = file_path.as_ref();
        let mut wtr = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to create CSV file {}: {}", path.display(), e),
            })?;

        let mut header = vec!["timestamp".to_string()];
        header.extend(dataset.column_names().iter().cloned());
        wtr.write_record(&header).map_err(csv_write_error)?;

        for (row, timestamp) in dataset.index().iter().enumerate() {
            let mut record = vec![timestamp.to_rfc3339()];
            for position in 0..dataset.num_columns() {
                let value = dataset.column_at(position).map_or(f64::NAN, |c| c[row]);
                record.push(if value.is_nan() {
                    String::new()
                } else {
                    value.to_string()
                });
            }
            wtr.write_record(&record).map_err(csv_write_error)?;
        }
        wtr.flush()?;

        tracing::info!("Wrote {} rows to {}", dataset.len(), path.display());
        Ok(())
    }

    fn detect_timestamp_column(headers: &StringRecord) -> usize {
        headers
            .iter()
            .position(|h| {
                matches!(
                    h.trim().to_lowercase().as_str(),
                    "timestamp" | "date" | "datetime" | "time" | "index" | ""
                )
            })
            .unwrap_or(0)
    }

    fn parse_record(
        record: &StringRecord,
        timestamp_idx: usize,
        value_columns: &[(usize, String)],
    ) -> LcResult<(DateTime<Utc>, Vec<f64>)> {
        let timestamp = parse_timestamp(record.get(timestamp_idx).unwrap_or("").trim())?;
        let row = value_columns
            .iter()
            .map(|(i, name)| parse_value(record.get(*i).unwrap_or(""), name))
            .collect::<LcResult<Vec<f64>>>()?;
        Ok((timestamp, row))
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn csv_write_error(e: csv::Error) -> DataError {
    DataError::LoadingFailed {
        message: format!("Failed to write CSV record: {}", e),
    }
}

/// Parse a timestamp string into `DateTime<Utc>`
pub fn parse_timestamp(timestamp_str: &str) -> LcResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Date-only values are taken as midnight UTC
    if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(timestamp_str, "%Y-%m-%d") {
        if let Some(naive_dt) = naive_date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",  // 2021-01-01 10:30:00
        "%Y-%m-%d %H:%M",     // 2021-01-01 10:30
        "%Y/%m/%d %H:%M:%S",  // 2021/01/01 10:30:00
        "%d-%m-%Y %H:%M",     // 01-01-2021 10:30
        "%Y-%m-%dT%H:%M:%S",  // 2021-01-01T10:30:00
        "%Y-%m-%dT%H:%M:%SZ", // 2021-01-01T10:30:00Z
    ];

    for format in &formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(timestamp_str, format) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    // Unix seconds
    if let Ok(timestamp) = timestamp_str.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(timestamp, 0) {
            return Ok(dt);
        }
    }

    Err(DataError::ParseError {
        message: format!("Could not parse timestamp: {}", timestamp_str),
    }
    .into())
}

fn parse_value(value_str: &str, field_name: &str) -> LcResult<f64> {
    let value_str = value_str.trim();
    if value_str.is_empty() || value_str.eq_ignore_ascii_case("nan") || value_str == "NA" {
        return Ok(f64::NAN);
    }
    value_str.parse::<f64>().map_err(|e| {
        DataError::ParseError {
            message: format!("Could not parse {} value '{}': {}", field_name, value_str, e),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_csv_with_missing_values() {
        let file = write_temp(
            "datetime,load,temp\n\
             2021-01-01 00:00:00,10.5,3.0\n\
             2021-01-01 00:15:00,,3.5\n\
             2021-01-01 00:30:00,11.0,NA\n",
        );
        let data = CsvLoader::new().load(file.path()).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.column_names(), &["load".to_string(), "temp".to_string()]);
        assert!(data.column("load").unwrap()[1].is_nan());
        assert!(data.column("temp").unwrap()[2].is_nan());
    }

    #[test]
    fn skips_records_with_bad_values() {
        let file = write_temp(
            "timestamp,load\n\
             2021-01-01T00:00:00Z,1.0\n\
             not-a-date,2.0\n\
             2021-01-01T01:00:00Z,abc\n\
             2021-01-01T02:00:00Z,3.0\n",
        );
        let data = CsvLoader::new().load(file.path()).unwrap();
        assert_eq!(data.column("load").unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn unordered_rows_are_rejected() {
        let file = write_temp(
            "timestamp,load\n\
             2021-01-01T01:00:00Z,1.0\n\
             2021-01-01T00:00:00Z,2.0\n",
        );
        assert!(CsvLoader::new().load(file.path()).is_err());
    }

    #[test]
    fn write_then_load_keeps_layout() {
        let input = write_temp(
            "timestamp,load,horizon\n\
             2021-01-01T00:00:00Z,1.5,24\n\
             2021-01-01T01:00:00Z,,24\n",
        );
        let loader = CsvLoader::new();
        let data = loader.load(input.path()).unwrap();

        let output = NamedTempFile::new().unwrap();
        loader.write(&data, output.path()).unwrap();
        let reloaded = loader.load(output.path()).unwrap();

        assert_eq!(reloaded.column_names(), data.column_names());
        assert_eq!(reloaded.index(), data.index());
        assert!(reloaded.column("load").unwrap()[1].is_nan());
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2021-06-01").is_ok());
        assert!(parse_timestamp("2021-06-01 13:45").is_ok());
        assert!(parse_timestamp("2021-06-01T13:45:00+02:00").is_ok());
        assert!(parse_timestamp("1622548800").is_ok());
        assert!(parse_timestamp("June first").is_err());
    }
}
