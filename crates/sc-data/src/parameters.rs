//! The simulator's parameter table.
//!
//! One row per population, one column per model parameter. Cells are kept as
//! the raw text found in the file so that columns the calibration never
//! touches are written back exactly as they were read.

use std::path::Path;

use sc_types::{DataError, ScResult};

/// Editable, text-preserving parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ParameterTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> ScResult<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(DataError::ParseError {
                message: format!(
                    "parameter row {} has {} cells, expected {}",
                    idx,
                    row.len(),
                    headers.len()
                ),
            }
            .into());
        }
        Ok(Self { headers, rows })
    }

    pub fn load_csv<P: AsRef<Path>>(file_path: P) -> ScResult<Self> {
        let path = file_path.as_ref();
        tracing::info!("Loading parameter table from: {}", path.display());

        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open parameter file {}: {}", path.display(), e),
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read parameter headers: {}", e),
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read parameter record at line {}: {}", line_num + 2, e),
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::new(headers, rows)
    }

    /// Write the table as CSV without an index column.
    pub fn write_csv<P: AsRef<Path>>(&self, file_path: P) -> ScResult<()> {
        let path = file_path.as_ref();
        let mut wtr = csv::Writer::from_path(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to create parameter file {}: {}", path.display(), e),
        })?;

        let write_err = |e: csv::Error| DataError::LoadingFailed {
            message: format!("Failed to write parameter file {}: {}", path.display(), e),
        };
        wtr.write_record(&self.headers).map_err(write_err)?;
        for row in &self.rows {
            wtr.write_record(row).map_err(write_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    fn check_row(&self, row: usize) -> ScResult<()> {
        if row >= self.rows.len() {
            return Err(DataError::RowOutOfRange {
                row,
                rows: self.rows.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Raw text of one cell.
    pub fn get(&self, row: usize, column: &str) -> ScResult<&str> {
        self.check_row(row)?;
        let idx = self.column_index(column).ok_or_else(|| DataError::MissingColumn {
            column: column.to_string(),
        })?;
        Ok(&self.rows[row][idx])
    }

    /// Overwrite one cell. An unknown column is appended, empty in every
    /// other row.
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) -> ScResult<()> {
        self.check_row(row)?;
        let idx = self.ensure_column(column);
        self.rows[row][idx] = value.into();
        Ok(())
    }

    /// Overwrite a numeric cell using the shortest round-trip representation.
    pub fn set_f64(&mut self, row: usize, column: &str, value: f64) -> ScResult<()> {
        self.set(row, column, format!("{value}"))
    }

    /// Set the same value in every row of a column.
    pub fn set_column(&mut self, column: &str, value: impl Into<String>) {
        let idx = self.ensure_column(column);
        let value = value.into();
        for row in &mut self.rows {
            row[idx] = value.clone();
        }
    }

    /// Apply a JSON object of `{column: value}` overrides to every row.
    ///
    /// Returns the number of columns written.
    pub fn apply_overrides(
        &mut self,
        overrides: &serde_json::Map<String, serde_json::Value>,
    ) -> ScResult<usize> {
        for (column, value) in overrides {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(DataError::ParseError {
                        message: format!("unsupported override for '{}': {}", column, other),
                    }
                    .into())
                }
            };
            tracing::info!("Overwriting {} with {}", column, text);
            self.set_column(column, text);
        }
        Ok(overrides.len())
    }

    fn ensure_column(&mut self, column: &str) -> usize {
        match self.column_index(column) {
            Some(idx) => idx,
            None => {
                self.headers.push(column.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
                self.headers.len() - 1
            }
        }
    }
}
