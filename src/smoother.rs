//! Trend smoothing
//!
//! Metric time series are noisy day to day. This module reduces the noise in
//! two steps: long series are first summarized to weekly means, then every
//! metric is passed through a first-order Savitzky–Golay filter, which follows
//! local trends without the lag of a moving average.

use crate::error::ComputeError;
use crate::table::MetricsTable;
use crate::types::Value;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fewest points a series needs to be smoothed
pub const MIN_SMOOTHING_POINTS: usize = 3;

/// Options for [`smoothen_trend_data`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingOptions {
    /// Largest filter window, in points
    pub max_window: usize,
    /// Series spanning at least this many weeks are resampled to weekly means
    pub weekly_after_weeks: i64,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            max_window: 31,
            weekly_after_weeks: 5,
        }
    }
}

/// Smooth `metric_columns` of a date-indexed table.
///
/// Returns a table with only the date column and the metric columns, sorted
/// by date. Tables with fewer than [`MIN_SMOOTHING_POINTS`] rows are returned
/// unchanged with a warning. Rows without a date are dropped.
pub fn smoothen_trend_data(
    table: &MetricsTable,
    metric_columns: &[&str],
    date_column: &str,
    options: &SmoothingOptions,
) -> Result<MetricsTable, ComputeError> {
    if table.num_rows() < MIN_SMOOTHING_POINTS {
        warn!(rows = table.num_rows(), "too few data points for smoothing");
        return Ok(table.clone());
    }
    if options.max_window == 0 {
        return Err(ComputeError::InvalidArgument(
            "max_window must be at least 1".to_string(),
        ));
    }

    let dates = table.date_column(date_column)?;
    let metrics = metric_columns
        .iter()
        .map(|name| table.numeric_column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows: Vec<(NaiveDate, usize)> = dates
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|d| (d, i)))
        .collect();
    rows.sort_by_key(|&(date, _)| date);

    let mut series_dates: Vec<NaiveDate> = rows.iter().map(|&(d, _)| d).collect();
    let mut series: Vec<Vec<Option<f64>>> = metrics
        .iter()
        .map(|column| rows.iter().map(|&(_, i)| column[i]).collect())
        .collect();

    if let (Some(&first), Some(&last)) = (series_dates.first(), series_dates.last()) {
        // A threshold beyond the date range never triggers resampling
        let weekly_from = Duration::try_weeks(options.weekly_after_weeks)
            .and_then(|span| first.checked_add_signed(span));
        if weekly_from.is_some_and(|threshold| threshold <= last) {
            (series_dates, series) = resample_weekly(&series_dates, &series);
        }
    }

    let window = smoothing_window(series_dates.len(), options.max_window);
    debug!(points = series_dates.len(), window, "smoothing trend data");

    let mut output = MetricsTable::new().with_column(
        date_column,
        series_dates.into_iter().map(Value::Date).collect(),
    )?;
    for (name, values) in metric_columns.iter().zip(&series) {
        output = output.with_numeric_column(*name, &savgol_linear(values, window))?;
    }
    Ok(output)
}

/// The first week boundary (Monday) strictly after `date`
pub fn following_week_start(date: NaiveDate) -> NaiveDate {
    date + Duration::days(7 - i64::from(date.weekday().num_days_from_monday()))
}

/// Odd filter window: half the series, clamped to `[1, max_window]`
pub fn smoothing_window(points: usize, max_window: usize) -> usize {
    let window = (points / 2).max(1).min(max_window.max(1));
    if window % 2 == 1 {
        window
    } else if window < max_window {
        window + 1
    } else {
        window - 1
    }
}

/// Average each series per following-Monday bucket; input dates must be sorted
fn resample_weekly(
    dates: &[NaiveDate],
    series: &[Vec<Option<f64>>],
) -> (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) {
    let buckets: Vec<NaiveDate> = dates.iter().map(|&d| following_week_start(d)).collect();

    let mut bucket_dates = Vec::new();
    let mut ranges = Vec::new();
    let mut start = 0;
    for pos in 1..=buckets.len() {
        if pos == buckets.len() || buckets[pos] != buckets[start] {
            bucket_dates.push(buckets[start]);
            ranges.push(start..pos);
            start = pos;
        }
    }

    let resampled = series
        .iter()
        .map(|values| {
            ranges
                .iter()
                .map(|range| {
                    let present: Vec<f64> = values[range.clone()].iter().flatten().copied().collect();
                    (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
                })
                .collect()
        })
        .collect();

    (bucket_dates, resampled)
}

/// Savitzky–Golay filter of polynomial order 1.
///
/// Each point takes the value of the least-squares line through the window
/// centred on it. The first and last `window / 2` points use the line through
/// the first and last full window. A window containing a null yields null.
pub fn savgol_linear(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    if window <= 1 || n < window {
        return values.to_vec();
    }

    let half = window / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            fit_line(&values[start..start + window], start)
                .map(|(x_mean, y_mean, slope)| y_mean + slope * (i as f64 - x_mean))
        })
        .collect()
}

/// Least-squares line through `(offset + j, ys[j])` as (x mean, y mean, slope)
fn fit_line(ys: &[Option<f64>], offset: usize) -> Option<(f64, f64, f64)> {
    let ys: Vec<f64> = ys.iter().copied().collect::<Option<Vec<f64>>>()?;
    let n = ys.len() as f64;
    let x_mean = offset as f64 + (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (j, y) in ys.iter().enumerate() {
        let dx = (offset + j) as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    Some((x_mean, y_mean, slope))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily_table(start: NaiveDate, values: &[Option<f64>]) -> MetricsTable {
        MetricsTable::from_columns(vec![
            (
                "Date",
                (0..values.len() as i64)
                    .map(|i| Value::Date(start + Duration::days(i)))
                    .collect(),
            ),
            ("Accuracy", values.iter().map(|&v| Value::from(v)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_too_few_points_unchanged() {
        let table = daily_table(date(2024, 1, 1), &[Some(1.0), Some(5.0)]);
        let output =
            smoothen_trend_data(&table, &["Accuracy"], "Date", &SmoothingOptions::default()).unwrap();
        assert_eq!(output, table);
    }

    #[test]
    fn test_window_length() {
        assert_eq!(smoothing_window(3, 31), 1);
        assert_eq!(smoothing_window(4, 31), 3);
        assert_eq!(smoothing_window(8, 31), 5);
        assert_eq!(smoothing_window(11, 31), 5);
        assert_eq!(smoothing_window(100, 31), 31);
        assert_eq!(smoothing_window(100, 30), 29);
        assert_eq!(smoothing_window(100, 1), 1);
    }

    #[test]
    fn test_following_week_start() {
        // 2024-01-01 is a Monday
        assert_eq!(following_week_start(date(2024, 1, 1)), date(2024, 1, 8));
        assert_eq!(following_week_start(date(2024, 1, 3)), date(2024, 1, 8));
        assert_eq!(following_week_start(date(2024, 1, 7)), date(2024, 1, 8));
    }

    #[test]
    fn test_linear_trend_preserved() {
        let values: Vec<Option<f64>> = (0..12).map(|i| Some(2.0 * f64::from(i) + 1.0)).collect();
        let table = daily_table(date(2024, 2, 1), &values);
        let output =
            smoothen_trend_data(&table, &["Accuracy"], "Date", &SmoothingOptions::default()).unwrap();

        let smoothed = output.numeric_column("Accuracy").unwrap();
        for (s, v) in smoothed.iter().zip(&values) {
            assert!((s.unwrap() - v.unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_noise_reduced() {
        let values: Vec<Option<f64>> = (0..20)
            .map(|i| Some(if i % 2 == 0 { 0.0 } else { 10.0 }))
            .collect();
        let smoothed = savgol_linear(&values, 9);
        for s in &smoothed[4..16] {
            let s = s.unwrap();
            assert!((4.0..=6.0).contains(&s), "{} not near 5", s);
        }
    }

    #[test]
    fn test_edges_use_full_window_fit() {
        // Points on a line except the ends; the edge value follows the
        // fitted line rather than the raw point.
        let values = vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(10.0)];
        let smoothed = savgol_linear(&values, 3);
        assert!((smoothed[0].unwrap() - 0.0).abs() < 1e-12);
        assert!((smoothed[2].unwrap() - 2.0).abs() < 1e-12);
        // Last window [2, 3, 10]: slope 4, centre 5 at x = 3, so x = 4 -> 9
        assert!((smoothed[4].unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_nulls_only_affect_their_windows() {
        let mut values: Vec<Option<f64>> = (0..11).map(|i| Some(f64::from(i))).collect();
        values[5] = None;
        let smoothed = savgol_linear(&values, 5);
        let nulls: Vec<usize> = (0..11).filter(|&i| smoothed[i].is_none()).collect();
        assert_eq!(nulls, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_weekly_resampling() {
        // Six full weeks starting on a Monday; value = day index
        let values: Vec<Option<f64>> = (0..42).map(|i| Some(f64::from(i))).collect();
        let table = daily_table(date(2024, 1, 1), &values);
        let output =
            smoothen_trend_data(&table, &["Accuracy"], "Date", &SmoothingOptions::default()).unwrap();

        assert_eq!(output.num_rows(), 6);
        let dates = output.date_column("Date").unwrap();
        assert_eq!(dates[0], Some(date(2024, 1, 8)));
        assert!(dates.iter().all(|d| d.unwrap().weekday() == chrono::Weekday::Mon));

        let smoothed = output.numeric_column("Accuracy").unwrap();
        for (week, s) in smoothed.iter().enumerate() {
            assert!((s.unwrap() - (3.0 + 7.0 * week as f64)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_span_stays_daily() {
        let values: Vec<Option<f64>> = (0..20).map(|i| Some(f64::from(i))).collect();
        let table = daily_table(date(2024, 1, 1), &values);
        let output =
            smoothen_trend_data(&table, &["Accuracy"], "Date", &SmoothingOptions::default()).unwrap();
        assert_eq!(output.num_rows(), 20);
    }

    #[test]
    fn test_huge_weekly_threshold_stays_daily() {
        let values: Vec<Option<f64>> = (0..50).map(|i| Some(f64::from(i))).collect();
        let table = daily_table(date(2024, 1, 1), &values);

        for weeks in [i64::MAX / 1000, i64::MAX] {
            let options = SmoothingOptions {
                weekly_after_weeks: weeks,
                ..Default::default()
            };
            let output = smoothen_trend_data(&table, &["Accuracy"], "Date", &options).unwrap();
            assert_eq!(output.num_rows(), 50);
        }
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let table = MetricsTable::from_columns(vec![
            (
                "Date",
                vec![
                    Value::from("2024-01-03"),
                    Value::from("2024-01-01"),
                    Value::from("2024-01-02"),
                ],
            ),
            ("Speed", vec![Value::Float(3.0), Value::Float(1.0), Value::Float(2.0)]),
            ("Ignored", vec![Value::Int(0), Value::Int(0), Value::Int(0)]),
        ])
        .unwrap();

        let output =
            smoothen_trend_data(&table, &["Speed"], "Date", &SmoothingOptions::default()).unwrap();
        assert_eq!(output.column_names(), vec!["Date", "Speed"]);
        assert_eq!(
            output.numeric_column("Speed").unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn test_unknown_metric_column() {
        let table = daily_table(date(2024, 1, 1), &[Some(1.0), Some(2.0), Some(3.0)]);
        let result = smoothen_trend_data(&table, &["Nope"], "Date", &SmoothingOptions::default());
        assert!(matches!(result, Err(ComputeError::ColumnNotFound(_))));
    }
}
