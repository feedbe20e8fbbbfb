use std::path::Path;

use sc_types::{DataError, ScResult, Table};

/// Cell values treated as missing when parsing numeric columns.
const MISSING_MARKERS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

/// Loader for row-per-timestep CSV tables.
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

    /// Load a CSV file with a header row into a numeric [`Table`].
    ///
    /// Every column is kept. Cells that are empty, a missing-value marker or
    /// not a number become `None`, so text columns (timestamps, labels) load
    /// as all-missing rather than failing the whole file.
    pub fn load_table<P: AsRef<Path>>(&self, file_path: P) -> ScResult<Table> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV table from: {}", path.display());

        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        tracing::debug!("CSV headers: {:?}", headers);

        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];
        let mut non_numeric = vec![0usize; headers.len()];

        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line_num + 2, e),
            })?;

            if record.len() != headers.len() {
                return Err(DataError::ParseError {
                    message: format!(
                        "CSV record at line {} has {} columns, expected {}",
                        line_num + 2,
                        record.len(),
                        headers.len()
                    ),
                }
                .into());
            }

            for (idx, cell) in record.iter().enumerate() {
                let value = parse_cell(cell);
                if value.is_none() && !is_missing_marker(cell) {
                    non_numeric[idx] += 1;
                }
                columns[idx].push(value);
            }
        }

        for (header, count) in headers.iter().zip(&non_numeric) {
            if *count > 0 {
                tracing::debug!("Column '{}' has {} non-numeric cells", header, count);
            }
        }

        let table = Table::from_columns(headers.into_iter().zip(columns))?;
        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            table.num_rows(),
            table.num_columns(),
            path.display()
        );
        Ok(table)
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_missing_marker(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

/// Parse one numeric cell, mapping missing markers and garbage to `None`.
fn parse_cell(cell: &str) -> Option<f64> {
    if is_missing_marker(cell) {
        return None;
    }
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_loading_with_gaps() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "julian-day,PD,E,label").unwrap();
        writeln!(temp_file, "200,-0.5,1.2,a").unwrap();
        writeln!(temp_file, "201,,1.4,b").unwrap();
        writeln!(temp_file, "202,NA,NaN,c").unwrap();
        writeln!(temp_file, "203,-0.7, 1.9 ,d").unwrap();
        temp_file.flush().unwrap();

        let table = CsvLoader::new().load_table(temp_file.path()).unwrap();
        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.column_names(), &["julian-day", "PD", "E", "label"]);

        let pd = table.column("PD").unwrap();
        assert_eq!(pd, &[Some(-0.5), None, None, Some(-0.7)]);

        let e = table.column("E").unwrap();
        assert_eq!(e[2], None);
        assert_eq!(e[3], Some(1.9));

        assert!(table.column("label").unwrap().iter().all(Option::is_none));
    }

    #[test]
    fn test_custom_delimiter() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "day;GS").unwrap();
        writeln!(temp_file, "1;0.25").unwrap();
        temp_file.flush().unwrap();

        let table = CsvLoader::with_delimiter(b';')
            .load_table(temp_file.path())
            .unwrap();
        assert_eq!(table.column("GS").unwrap(), &[Some(0.25)]);
    }

    #[test]
    fn test_ragged_record_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a,b").unwrap();
        writeln!(temp_file, "1,2,3").unwrap();
        temp_file.flush().unwrap();

        assert!(CsvLoader::new().load_table(temp_file.path()).is_err());
    }

    #[test]
    fn test_loading_nonexistent_file() {
        let result = CsvLoader::new().load_table("/path/that/does/not/exist.csv");

        match result.unwrap_err() {
            sc_types::ScError::Data(DataError::NotFound { .. }) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }
}
