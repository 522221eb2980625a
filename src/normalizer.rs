//! Statistical normalization
//!
//! This module rescales metric values so that they are comparable within a
//! cohort:
//! - Min-max scaling into a fixed range
//! - Optional log transform for one-sided (strictly positive) metrics
//! - Standardization to zero mean and unit variance (z-scores)
//!
//! Missing values are ignored when fitting and stay missing in the output.

use crate::error::ComputeError;
use crate::table::MetricsTable;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Scales below this are treated as zero, leaving values centred at 0
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Options for [`calculate_z_scores`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZScoreOptions {
    /// Lower bound of the min-max range
    pub lower_limit: f64,
    /// Upper bound of the min-max range
    pub upper_limit: f64,
    /// Min-max scale the input before anything else
    pub scale_input: bool,
    /// Take the natural log before standardizing; requires positive input
    pub log_transform: bool,
    /// Min-max scale the standardized output
    pub scale_output: bool,
}

impl Default for ZScoreOptions {
    fn default() -> Self {
        Self {
            lower_limit: 0.0,
            upper_limit: 1.0,
            scale_input: false,
            log_transform: false,
            scale_output: false,
        }
    }
}

impl ZScoreOptions {
    /// Plain z-scores of the log of the input
    pub fn log_transformed() -> Self {
        Self {
            log_transform: true,
            ..Self::default()
        }
    }
}

/// Linearly map the present values onto `[lower, upper]`.
///
/// A constant input maps every value to `lower`.
pub fn min_max_scale(values: &[Option<f64>], lower: f64, upper: f64) -> Vec<Option<f64>> {
    let present = values.iter().flatten();
    let min = present.clone().copied().fold(f64::INFINITY, f64::min);
    let max = present.copied().fold(f64::NEG_INFINITY, f64::max);
    let range = if max - min < MIN_SCALE { 1.0 } else { max - min };

    values
        .iter()
        .map(|v| v.map(|x| (x - min) / range * (upper - lower) + lower))
        .collect()
}

/// Standardize the present values with the population standard deviation
pub fn standard_scale(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return values.to_vec();
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let scale = if std_dev < MIN_SCALE { 1.0 } else { std_dev };

    values
        .iter()
        .map(|v| v.map(|x| (x - mean) / scale))
        .collect()
}

/// Normalize values and compute z-scores.
///
/// Fails with [`ComputeError::InvalidPrecondition`] when a log transform is
/// requested on input that is not strictly positive: with `scale_input` this
/// means `lower_limit <= 0`, otherwise any present value `<= 0`. No partial
/// result is produced in that case.
pub fn calculate_z_scores(
    values: &[Option<f64>],
    options: &ZScoreOptions,
) -> Result<Vec<Option<f64>>, ComputeError> {
    if options.log_transform {
        if options.scale_input && options.lower_limit <= 0.0 {
            return Err(ComputeError::InvalidPrecondition(format!(
                "log transform needs a positive lower limit, got {}",
                options.lower_limit
            )));
        }
        if !options.scale_input {
            if let Some(bad) = values.iter().flatten().find(|&&x| x <= 0.0) {
                return Err(ComputeError::InvalidPrecondition(format!(
                    "log transform needs positive input, found {}",
                    bad
                )));
            }
        }
    }

    debug!(count = values.len(), ?options, "computing z-scores");

    let scaled = if options.scale_input {
        min_max_scale(values, options.lower_limit, options.upper_limit)
    } else {
        values.to_vec()
    };

    let transformed: Vec<Option<f64>> = if options.log_transform {
        scaled.into_iter().map(|v| v.map(f64::ln)).collect()
    } else {
        scaled
    };

    let standardized = standard_scale(&transformed);

    Ok(if options.scale_output {
        min_max_scale(&standardized, options.lower_limit, options.upper_limit)
    } else {
        standardized
    })
}

/// Compute z-scores of `score_column` within each group of `group_columns`.
///
/// Rows are sorted by `(group_columns, score_column)` and the returned table
/// keeps that order. The result is written to `output_column`, defaulting to
/// `<score_column>ZScore`. A group whose values violate the log-transform
/// precondition gets null scores; the other groups are unaffected.
pub fn calculate_column_z_scores(
    table: &MetricsTable,
    group_columns: &[&str],
    score_column: &str,
    output_column: Option<&str>,
    options: &ZScoreOptions,
) -> Result<MetricsTable, ComputeError> {
    let output_column = output_column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}ZScore", score_column));

    let order = sort_order(table, group_columns, score_column)?;
    let scores = grouped_z_scores(table, &order, group_columns, score_column, options)?;

    Ok(table
        .clone()
        .with_numeric_column(output_column, &scores)?
        .take(&order))
}

/// Row order used by every grouped transform: `(groups..., score)` ascending
pub(crate) fn sort_order(
    table: &MetricsTable,
    group_columns: &[&str],
    score_column: &str,
) -> Result<Vec<usize>, ComputeError> {
    let mut keys = group_columns.to_vec();
    keys.push(score_column);
    table.sorted_indices(&keys)
}

/// Per-group z-scores indexed by table row
pub(crate) fn grouped_z_scores(
    table: &MetricsTable,
    order: &[usize],
    group_columns: &[&str],
    score_column: &str,
    options: &ZScoreOptions,
) -> Result<Vec<Option<f64>>, ComputeError> {
    table.map_groups(order, group_columns, score_column, |key, values| {
        match calculate_z_scores(values, options) {
            Ok(scores) => Ok(scores),
            Err(ComputeError::InvalidPrecondition(reason)) => {
                error!(group = %format_key(key), column = score_column, %reason,
                    "invalid input for log transform, scores left empty");
                Ok(vec![None; values.len()])
            }
            Err(e) => Err(e),
        }
    })
}

pub(crate) fn format_key(key: &[Value]) -> String {
    key.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("/")
}
