//! Column-oriented numeric table used for ground truth and simulator output.

use std::collections::HashMap;

use crate::errors::{DataError, ScResult};

/// A row-per-timestep table of numeric columns.
///
/// Rows are addressed by their position in the source file, which is the
/// index used to align simulator output with ground truth. Missing cells are
/// stored as `None`; `NaN` values are normalized to `None` on insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    data: HashMap<String, Vec<Option<f64>>>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns, which must all have the same length.
    pub fn from_columns<I, S>(columns: I) -> ScResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<Option<f64>>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> ScResult<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = values.len();
        } else if values.len() != self.rows {
            return Err(DataError::ParseError {
                message: format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    self.rows
                ),
            }
            .into());
        }

        let values = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();

        if self.data.insert(name.clone(), values).is_none() {
            self.columns.push(name);
        }
        Ok(())
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.data.get(name).map(Vec::as_slice)
    }

    /// Like [`Table::column`] but reports a missing column as an error.
    pub fn require_column(&self, name: &str) -> ScResult<&[Option<f64>]> {
        self.column(name).ok_or_else(|| {
            DataError::MissingColumn {
                column: name.to_string(),
            }
            .into()
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_keep_insertion_order() {
        let table = Table::from_columns(vec![
            ("julian-day", vec![Some(200.0), Some(201.0)]),
            ("PD", vec![Some(-0.5), None]),
        ])
        .unwrap();

        assert_eq!(table.column_names(), &["julian-day", "PD"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("PD").unwrap()[1], None);
    }

    #[test]
    fn nan_becomes_missing() {
        let table = Table::from_columns(vec![("E", vec![Some(f64::NAN), Some(1.0)])]).unwrap();
        assert_eq!(table.column("E").unwrap(), &[None, Some(1.0)]);
    }

    #[test]
    fn ragged_columns_rejected() {
        let mut table = Table::new();
        table.push_column("a", vec![Some(1.0), Some(2.0)]).unwrap();
        assert!(table.push_column("b", vec![Some(1.0)]).is_err());
    }

    #[test]
    fn missing_column_is_an_error() {
        let table = Table::new();
        assert!(table.column("PD").is_none());
        assert!(table.require_column("PD").is_err());
    }
}
