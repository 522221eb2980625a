//! Percentile ranking
//!
//! Rank-based normalisation within a cohort: assign ascending rank r in
//! [1, N], averaging the ranks of tied values, then report r / N.

use crate::error::ComputeError;
use crate::normalizer::sort_order;
use crate::table::MetricsTable;
use std::cmp::Ordering;

/// Fractional ranks in (0, 1] with average ranks for ties.
/// Missing values are not ranked and do not count towards N.
pub fn percentile_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut indexed: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let n = indexed.len();
    let mut ranks = vec![None; values.len()];
    let mut i = 0;
    while i < n {
        // Find group of equal scores
        let mut j = i;
        while j + 1 < n && indexed[j + 1].1 == indexed[i].1 {
            j += 1;
        }
        let avg_rank = (i + 1 + j + 1) as f64 / 2.0;
        for &(row, _) in &indexed[i..=j] {
            ranks[row] = Some(avg_rank / n as f64);
        }
        i = j + 1;
    }
    ranks
}

/// Percentile rank of `score_column` within each group of `group_columns`.
///
/// Rows are sorted by `(group_columns, score_column)` and the returned table
/// keeps that order. The result is written to `output_column`, defaulting to
/// `<score_column>Pct`.
pub fn calculate_column_percentiles(
    table: &MetricsTable,
    group_columns: &[&str],
    score_column: &str,
    output_column: Option<&str>,
) -> Result<MetricsTable, ComputeError> {
    let output_column = output_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}Pct", score_column));

    let order = sort_order(table, group_columns, score_column)?;
    let ranks = table.map_groups(&order, group_columns, score_column, |_, values| {
        Ok(percentile_ranks(values))
    })?;

    Ok(table
        .clone()
        .with_numeric_column(output_column, &ranks)?
        .take(&order))
}
