//! Metrics history gap filling
//!
//! Metric snapshots are only recorded on days a user practices. This module
//! turns such a sparse history into a dense daily series per user (and
//! category) by carrying the last known snapshot forward.

use crate::error::ComputeError;
use crate::table::MetricsTable;
use crate::types::Value;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Key columns identifying a user's snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryKeys {
    pub user_column: String,
    pub date_column: String,
}

impl Default for HistoryKeys {
    fn default() -> Self {
        Self {
            user_column: "UserId".to_string(),
            date_column: "UpdatedOn".to_string(),
        }
    }
}

/// One output row: (user + categories, date, metric values)
type HistoryRow = (Vec<Value>, NaiveDate, Vec<Value>);

/// Fill the gaps of a sparse per-user metrics history.
///
/// 1. Dates are truncated to days and only the first row per
///    `(user, date, categories)` is kept.
/// 2. Every `(user, categories)` combination is paired with every date
///    between the earliest and latest date of the whole history.
/// 3. Each combination's metrics are carried forward in date order; dates
///    before its first observation are left out.
/// 4. Rows where any metric is still missing after the carry are dropped.
///
/// `metrics_columns` defaults to every column that is neither a key nor a
/// category. The output columns are user, categories, date and metrics,
/// sorted by `(user, date, categories)`.
pub fn fill_metrics_history_gaps(
    history: &MetricsTable,
    category_columns: &[&str],
    metrics_columns: Option<&[&str]>,
    keys: &HistoryKeys,
) -> Result<MetricsTable, ComputeError> {
    let user_column = keys.user_column.as_str();
    let date_column = keys.date_column.as_str();

    let mut entity_columns = vec![user_column];
    entity_columns.extend_from_slice(category_columns);

    let metrics_columns: Vec<&str> = match metrics_columns {
        Some(columns) => columns.to_vec(),
        None => history
            .column_names()
            .into_iter()
            .filter(|c| *c != date_column && !entity_columns.contains(c))
            .collect(),
    };

    let dates = history.date_column(date_column)?;
    let metric_values = metrics_columns
        .iter()
        .map(|name| history.column(name))
        .collect::<Result<Vec<_>, _>>()?;

    // Sort by (user, date, categories) and keep the first row of each key
    let mut observed: Vec<(Vec<Value>, NaiveDate, usize)> = Vec::new();
    for (row, date) in dates.iter().enumerate() {
        if let Some(date) = date {
            observed.push((history.row_key(&entity_columns, row)?, *date, row));
        }
    }
    observed.sort_by(|a, b| compare_history_keys(&a.0, a.1, &b.0, b.1));

    let mut snapshots: BTreeMap<(Vec<Value>, NaiveDate), usize> = BTreeMap::new();
    for (entity, date, row) in &observed {
        snapshots.entry((entity.clone(), *date)).or_insert(*row);
    }

    let entities: BTreeSet<&Vec<Value>> = observed.iter().map(|(e, _, _)| e).collect();
    let date_range = observed
        .iter()
        .map(|(_, d, _)| *d)
        .min()
        .zip(observed.iter().map(|(_, d, _)| *d).max());

    let mut rows: Vec<HistoryRow> = Vec::new();
    if let Some((first_date, last_date)) = date_range {
        for entity in entities {
            let mut last_known: Option<Vec<Value>> = None;
            for date in first_date.iter_days().take_while(|d| *d <= last_date) {
                if let Some(&row) = snapshots.get(&(entity.clone(), date)) {
                    let carried = last_known.get_or_insert_with(|| vec![Value::Null; metric_values.len()]);
                    for (slot, column) in carried.iter_mut().zip(&metric_values) {
                        if !column[row].is_null() {
                            *slot = column[row].clone();
                        }
                    }
                }
                // Rows with a metric still unknown are left out
                let complete = last_known
                    .as_ref()
                    .filter(|values| !values.iter().any(Value::is_null));
                if let Some(values) = complete {
                    rows.push((entity.clone(), date, values.clone()));
                }
            }
        }
    }
    rows.sort_by(|a, b| compare_history_keys(&a.0, a.1, &b.0, b.1));

    debug!(
        observed = observed.len(),
        kept = snapshots.len(),
        filled = rows.len(),
        "filled metrics history gaps"
    );

    let mut columns: Vec<(String, Vec<Value>)> = entity_columns
        .iter()
        .enumerate()
        .map(|(k, name)| (name.to_string(), rows.iter().map(|r| r.0[k].clone()).collect()))
        .collect();
    columns.push((
        date_column.to_string(),
        rows.iter().map(|r| Value::Date(r.1)).collect(),
    ));
    for (m, name) in metrics_columns.iter().enumerate() {
        columns.push((name.to_string(), rows.iter().map(|r| r.2[m].clone()).collect()));
    }
    MetricsTable::from_columns(columns)
}

/// Order by user, then date, then categories
fn compare_history_keys(a: &[Value], a_date: NaiveDate, b: &[Value], b_date: NaiveDate) -> Ordering {
    a[0].cmp(&b[0])
        .then(a_date.cmp(&b_date))
        .then_with(|| a[1..].cmp(&b[1..]))
}
