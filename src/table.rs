//! Columnar metrics tables
//!
//! A `MetricsTable` is an ordered set of named, equal-length columns. Every
//! transform in this crate takes a table by reference and returns a new one;
//! nothing is modified in place.

use crate::error::ComputeError;
use crate::types::{Value, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Tabular dataset with named, typed columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsTable {
    columns: Vec<Column>,
}

/// Row-major "split" layout used on the wire
#[derive(Serialize, Deserialize)]
struct SplitTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs
    pub fn from_columns<N: Into<String>>(
        columns: Vec<(N, Vec<Value>)>,
    ) -> Result<Self, ComputeError> {
        let mut table = Self::new();
        for (name, values) in columns {
            let name = name.into();
            if table.has_column(&name) {
                return Err(ComputeError::DuplicateColumn(name));
            }
            table = table.with_column(name, values)?;
        }
        Ok(table)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the table has no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&[Value], ComputeError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| ComputeError::ColumnNotFound(name.to_string()))
    }

    /// Numeric view of a column; text or date cells are a type error
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, ComputeError> {
        self.column(name)?
            .iter()
            .map(|v| match v {
                Value::Null => Ok(None),
                Value::Int(_) | Value::Float(_) => Ok(v.as_f64()),
                other => Err(ComputeError::TypeMismatch(format!(
                    "column {} holds non-numeric value {}",
                    name, other
                ))),
            })
            .collect()
    }

    /// Date view of a column; text cells are parsed, timestamps truncated
    pub fn date_column(&self, name: &str) -> Result<Vec<Option<NaiveDate>>, ComputeError> {
        self.column(name)?
            .iter()
            .map(|v| match v {
                Value::Null => Ok(None),
                Value::Date(d) => Ok(Some(*d)),
                Value::Text(s) => parse_date(s).map(Some),
                other => Err(ComputeError::TypeMismatch(format!(
                    "column {} holds non-date value {}",
                    name, other
                ))),
            })
            .collect()
    }

    /// Append a column, replacing any existing column of the same name
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<Self, ComputeError> {
        let name = name.into();
        if !self.columns.is_empty() && values.len() != self.num_rows() {
            return Err(ComputeError::LengthMismatch(format!(
                "column {} has {} values, table has {} rows",
                name,
                values.len(),
                self.num_rows()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(self)
    }

    /// Append a numeric column from optional floats
    pub fn with_numeric_column(
        self,
        name: impl Into<String>,
        values: &[Option<f64>],
    ) -> Result<Self, ComputeError> {
        self.with_column(name, values.iter().map(|v| Value::from(*v)).collect())
    }

    /// Keep only the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Self, ComputeError> {
        let mut table = Self::new();
        for name in names {
            if table.has_column(name) {
                continue;
            }
            table = table.with_column(*name, self.column(name)?.to_vec())?;
        }
        Ok(table)
    }

    pub fn rename_column(mut self, from: &str, to: &str) -> Result<Self, ComputeError> {
        if from != to && self.has_column(to) {
            return Err(ComputeError::DuplicateColumn(to.to_string()));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| ComputeError::ColumnNotFound(from.to_string()))?;
        column.name = to.to_string();
        Ok(self)
    }

    /// New table holding the rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Keep rows for which `keep(row_index)` is true
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let indices: Vec<usize> = (0..self.num_rows()).filter(|&i| keep(i)).collect();
        self.take(&indices)
    }

    /// Row permutation sorting by `keys` ascending; ties keep input order
    pub fn sorted_indices(&self, keys: &[&str]) -> Result<Vec<usize>, ComputeError> {
        let key_columns = self.key_columns(keys)?;
        let mut indices: Vec<usize> = (0..self.num_rows()).collect();
        indices.sort_by(|&a, &b| {
            key_columns
                .iter()
                .map(|col| col[a].cmp(&col[b]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(indices)
    }

    pub fn sort_by(&self, keys: &[&str]) -> Result<Self, ComputeError> {
        Ok(self.take(&self.sorted_indices(keys)?))
    }

    /// Contiguous runs of equal `keys` when rows are visited in `order`.
    ///
    /// Ranges index into `order`, not into the table.
    pub fn group_runs(&self, order: &[usize], keys: &[&str]) -> Result<Vec<Range<usize>>, ComputeError> {
        let key_columns = self.key_columns(keys)?;
        let mut runs = Vec::new();
        let mut start = 0;
        for pos in 1..=order.len() {
            let boundary = pos == order.len()
                || key_columns
                    .iter()
                    .any(|col| col[order[pos]] != col[order[pos - 1]]);
            if boundary {
                runs.push(start..pos);
                start = pos;
            }
        }
        Ok(runs)
    }

    /// Apply `f` to the `score_column` values of each group.
    ///
    /// Rows are visited in `order`, which must keep each group contiguous;
    /// `f` receives the group key and the group's values in that order. The
    /// results are scattered back so that the output is indexed by table row.
    pub fn map_groups<F>(
        &self,
        order: &[usize],
        group_columns: &[&str],
        score_column: &str,
        mut f: F,
    ) -> Result<Vec<Option<f64>>, ComputeError>
    where
        F: FnMut(&[Value], &[Option<f64>]) -> Result<Vec<Option<f64>>, ComputeError>,
    {
        let scores = self.numeric_column(score_column)?;
        let mut output = vec![None; self.num_rows()];
        for run in self.group_runs(order, group_columns)? {
            let rows = &order[run];
            let Some(&first) = rows.first() else {
                continue;
            };
            let key = self.row_key(group_columns, first)?;
            let values: Vec<Option<f64>> = rows.iter().map(|&i| scores[i]).collect();
            let results = f(&key, &values)?;
            if results.len() != rows.len() {
                return Err(ComputeError::LengthMismatch(format!(
                    "group transform returned {} values for {} rows",
                    results.len(),
                    rows.len()
                )));
            }
            for (&row, result) in rows.iter().zip(results) {
                output[row] = result;
            }
        }
        Ok(output)
    }

    /// Group key values of one row
    pub fn row_key(&self, keys: &[&str], row: usize) -> Result<Vec<Value>, ComputeError> {
        Ok(self
            .key_columns(keys)?
            .iter()
            .map(|col| col[row].clone())
            .collect())
    }

    fn key_columns(&self, keys: &[&str]) -> Result<Vec<&[Value]>, ComputeError> {
        keys.iter().map(|k| self.column(k)).collect()
    }

    /// Re-type a text column as dates
    pub fn parse_dates(self, name: &str) -> Result<Self, ComputeError> {
        let dates = self.date_column(name)?;
        self.with_column(
            name,
            dates.into_iter().map(|d| d.map_or(Value::Null, Value::Date)).collect(),
        )
    }

    /// Load a table from split-layout JSON: `{"columns": [...], "data": [[...]]}`
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let split: SplitTable = serde_json::from_str(json)?;
        let width = split.columns.len();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(split.data.len()); width];
        for (row_num, row) in split.data.into_iter().enumerate() {
            if row.len() != width {
                return Err(ComputeError::LengthMismatch(format!(
                    "row {} has {} values, expected {}",
                    row_num,
                    row.len(),
                    width
                )));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Self::from_columns(split.columns.into_iter().zip(columns).collect())
    }

    /// Serialize the table to split-layout JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string(&self.to_split())?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(&self.to_split())?)
    }

    fn to_split(&self) -> SplitTable {
        SplitTable {
            columns: self.columns.iter().map(|c| c.name.clone()).collect(),
            data: (0..self.num_rows())
                .map(|i| self.columns.iter().map(|c| c.values[i].clone()).collect())
                .collect(),
        }
    }
}

/// Parse a date, accepting plain dates and timestamps (truncated to the day)
pub fn parse_date(s: &str) -> Result<NaiveDate, ComputeError> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Ok(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.date_naive())
        .map_err(|e| ComputeError::DateParseError(format!("{}: {}", s, e)))
}
