//! Activity metrics
//!
//! This module turns raw practice counters into comparable ratios:
//! - Accuracy: e^(correct / attempted)
//! - Span: practice volume relative to the cohort median
//! - Speed: cohort median time relative to the entity's own median time
//! - Velocity: accuracy + speed (+ span)
//!
//! Ratios backed by too few observations are `None`, never zero.

use crate::error::ComputeError;
use crate::table::MetricsTable;
use serde::{Deserialize, Serialize};

/// Default minimum number of observations for a guarded ratio
pub const DEFAULT_MIN_COUNT: u32 = 20;

/// Minimum-sample guard applied to ratio denominators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountGuard {
    pub check_count: bool,
    pub min_count: u32,
}

impl Default for CountGuard {
    fn default() -> Self {
        Self {
            check_count: false,
            min_count: DEFAULT_MIN_COUNT,
        }
    }
}

impl CountGuard {
    /// Guard that rejects denominators below `min_count`
    pub fn min(min_count: u32) -> Self {
        Self {
            check_count: true,
            min_count,
        }
    }

    /// True when `count` is too small to trust
    fn rejects(&self, count: Option<f64>) -> bool {
        self.check_count && count.map_or(true, |c| c < f64::from(self.min_count))
    }
}

/// Column names and options for [`compute_statistical_metrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalMetricsConfig {
    pub attempts_column: String,
    pub correct_column: String,
    pub ques_time_column: String,
    pub attempts_median_column: String,
    pub parent_time_column: String,
    pub include_span: bool,
    pub guard: CountGuard,
}

impl Default for StatisticalMetricsConfig {
    fn default() -> Self {
        Self {
            attempts_column: "Attempted".to_string(),
            correct_column: "Correct".to_string(),
            ques_time_column: "QuesTimeMedian".to_string(),
            attempts_median_column: "AttemptsMedian".to_string(),
            parent_time_column: "ParentTimeMedian".to_string(),
            include_span: true,
            guard: CountGuard::default(),
        }
    }
}

/// Symmetric sigmoid `2 / (1 + e^(-x/k)) - 1`, mapping the reals onto (-1, 1)
pub fn sigmoid(x: f64, k: f64) -> f64 {
    2.0 / (1.0 + (-x / k).exp()) - 1.0
}

/// Element-wise `num / den`, `None` where the denominator is missing, zero
/// or rejected by the guard.
pub fn compute_ratio(
    num: &[Option<f64>],
    den: &[Option<f64>],
    guard: CountGuard,
) -> Result<Vec<Option<f64>>, ComputeError> {
    check_lengths(&[num.len(), den.len()])?;
    Ok(num
        .iter()
        .zip(den)
        .map(|(n, d)| match (*n, *d) {
            (Some(n), Some(d)) if d != 0.0 && !guard.rejects(Some(d)) => finite(n / d),
            _ => None,
        })
        .collect())
}

/// Accuracy = e^(correct / attempts), within [1, e] for valid counters
pub fn compute_accuracy(
    correct: &[Option<f64>],
    attempts: &[Option<f64>],
    guard: CountGuard,
) -> Result<Vec<Option<f64>>, ComputeError> {
    Ok(compute_ratio(correct, attempts, guard)?
        .into_iter()
        .map(|r| r.map(f64::exp))
        .collect())
}

/// Span = sigmoid(ln(1 + attempts / attempts_median))
pub fn compute_span(
    attempts: &[Option<f64>],
    attempts_median: &[Option<f64>],
) -> Result<Vec<Option<f64>>, ComputeError> {
    Ok(compute_ratio(attempts, attempts_median, CountGuard::default())?
        .into_iter()
        .map(squash)
        .collect())
}

/// Speed = sigmoid(ln(1 + parent_time / ques_time)).
///
/// Faster than the cohort (smaller `ques_time`) scores higher. The guard is
/// applied to `attempts`, not to the times.
pub fn compute_speed(
    ques_time: &[Option<f64>],
    parent_time: &[Option<f64>],
    attempts: &[Option<f64>],
    guard: CountGuard,
) -> Result<Vec<Option<f64>>, ComputeError> {
    check_lengths(&[ques_time.len(), parent_time.len(), attempts.len()])?;
    let ratios = compute_ratio(parent_time, ques_time, CountGuard::default())?;
    Ok(ratios
        .into_iter()
        .zip(attempts)
        .map(|(ratio, a)| if guard.rejects(*a) { None } else { squash(ratio) })
        .collect())
}

/// Velocity = accuracy + speed + span; a missing component nulls the sum
pub fn compute_velocity(
    accuracy: &[Option<f64>],
    speed: &[Option<f64>],
    span: Option<&[Option<f64>]>,
) -> Result<Vec<Option<f64>>, ComputeError> {
    let mut lengths = vec![accuracy.len(), speed.len()];
    if let Some(span) = span {
        lengths.push(span.len());
    }
    check_lengths(&lengths)?;

    Ok(accuracy
        .iter()
        .zip(speed)
        .enumerate()
        .map(|(i, (a, s))| {
            let span_value = match span {
                Some(span) => span[i]?,
                None => 0.0,
            };
            Some((*a)? + (*s)? + span_value)
        })
        .collect())
}

/// Append `Accuracy`, `Span`, `Speed` and `Velocity` columns to a table
pub fn compute_statistical_metrics(
    table: &MetricsTable,
    config: &StatisticalMetricsConfig,
) -> Result<MetricsTable, ComputeError> {
    let attempts = table.numeric_column(&config.attempts_column)?;
    let correct = table.numeric_column(&config.correct_column)?;
    let ques_time = table.numeric_column(&config.ques_time_column)?;
    let parent_time = table.numeric_column(&config.parent_time_column)?;

    let accuracy = compute_accuracy(&correct, &attempts, config.guard)?;
    let speed = compute_speed(&ques_time, &parent_time, &attempts, config.guard)?;
    let span = if config.include_span {
        let attempts_median = table.numeric_column(&config.attempts_median_column)?;
        Some(compute_span(&attempts, &attempts_median)?)
    } else {
        None
    };
    let velocity = compute_velocity(&accuracy, &speed, span.as_deref())?;

    let mut output = table.clone().with_numeric_column("Accuracy", &accuracy)?;
    if let Some(span) = &span {
        output = output.with_numeric_column("Span", span)?;
    }
    output
        .with_numeric_column("Speed", &speed)?
        .with_numeric_column("Velocity", &velocity)
}

/// sigmoid(ln(1 + r)), `None` when the log is undefined
fn squash(ratio: Option<f64>) -> Option<f64> {
    ratio
        .and_then(|r| finite((1.0 + r).ln()))
        .map(|x| sigmoid(x, 1.0))
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn check_lengths(lengths: &[usize]) -> Result<(), ComputeError> {
    match lengths.split_first() {
        Some((first, rest)) if rest.iter().any(|l| l != first) => Err(
            ComputeError::LengthMismatch(format!("input lengths differ: {:?}", lengths)),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use std::f64::consts::E;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_ratio_guard() {
        let ratios = compute_ratio(
            &[Some(10.0), None, Some(5.0)],
            &[Some(20.0), Some(5.0), Some(0.0)],
            CountGuard::min(10),
        )
        .unwrap();
        assert_eq!(ratios, vec![Some(0.5), None, None]);
    }

    #[test]
    fn test_ratio_below_min_count() {
        let ratios = compute_ratio(&some(&[3.0, 3.0]), &some(&[5.0, 25.0]), CountGuard::min(20)).unwrap();
        assert_eq!(ratios, vec![None, Some(0.12)]);

        let unguarded = compute_ratio(&some(&[3.0]), &some(&[5.0]), CountGuard::default()).unwrap();
        assert_eq!(unguarded, vec![Some(0.6)]);
    }

    #[test]
    fn test_ratio_length_mismatch() {
        let result = compute_ratio(&some(&[1.0]), &some(&[1.0, 2.0]), CountGuard::default());
        assert!(matches!(result, Err(ComputeError::LengthMismatch(_))));
    }

    #[test]
    fn test_sigmoid_range() {
        assert_eq!(sigmoid(0.0, 1.0), 0.0);
        assert!(sigmoid(50.0, 1.0) <= 1.0 && sigmoid(50.0, 1.0) > 0.99);
        assert!(sigmoid(-50.0, 1.0) >= -1.0 && sigmoid(-50.0, 1.0) < -0.99);
        assert!((sigmoid(1.0, 2.0) - sigmoid(0.5, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_bounds() {
        for attempts in 0..30u32 {
            for correct in 0..=attempts {
                let acc = compute_accuracy(
                    &[Some(f64::from(correct))],
                    &[Some(f64::from(attempts))],
                    CountGuard::min(5),
                )
                .unwrap()[0];
                if attempts < 5 {
                    assert_eq!(acc, None);
                } else {
                    let acc = acc.unwrap();
                    let expected = (f64::from(correct) / f64::from(attempts)).exp();
                    assert!((acc - expected).abs() < 1e-12);
                    assert!((1.0..=E).contains(&acc));
                }
            }
        }
    }

    #[test]
    fn test_span() {
        let span = compute_span(&some(&[10.0, 0.0]), &[Some(10.0), Some(4.0)]).unwrap();
        assert!((span[0].unwrap() - sigmoid(2f64.ln(), 1.0)).abs() < 1e-12);
        assert_eq!(span[1], Some(0.0));

        let missing = compute_span(&some(&[10.0]), &[None]).unwrap();
        assert_eq!(missing, vec![None]);
    }

    #[test]
    fn test_speed_faster_is_higher() {
        let speed = compute_speed(
            &some(&[30.0, 60.0, 120.0]),
            &some(&[60.0, 60.0, 60.0]),
            &some(&[50.0, 50.0, 50.0]),
            CountGuard::min(20),
        )
        .unwrap();
        let (fast, typical, slow) = (speed[0].unwrap(), speed[1].unwrap(), speed[2].unwrap());
        assert!(fast > typical && typical > slow);
        assert!((typical - sigmoid(2f64.ln(), 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_speed_guard_uses_attempts() {
        let speed = compute_speed(
            &some(&[30.0, 30.0, 30.0]),
            &some(&[60.0, 60.0, 60.0]),
            &[Some(5.0), Some(25.0), None],
            CountGuard::min(20),
        )
        .unwrap();
        assert_eq!(speed[0], None);
        assert!(speed[1].is_some());
        assert_eq!(speed[2], None);
    }

    #[test]
    fn test_velocity_propagates_nulls() {
        let velocity = compute_velocity(
            &[Some(2.0), None, Some(1.5)],
            &[Some(0.5), Some(0.5), Some(0.25)],
            Some(&[Some(0.1), Some(0.1), None]),
        )
        .unwrap();
        assert_eq!(velocity, vec![Some(2.6), None, None]);

        let without_span = compute_velocity(&some(&[2.0]), &some(&[0.5]), None).unwrap();
        assert_eq!(without_span, vec![Some(2.5)]);
    }

    #[test]
    fn test_statistical_metrics_columns() {
        let table = MetricsTable::from_columns(vec![
            ("QuestionId", vec![Value::Int(1), Value::Int(2)]),
            ("Attempted", vec![Value::Int(40), Value::Int(0)]),
            ("Correct", vec![Value::Int(30), Value::Int(0)]),
            ("QuesTimeMedian", vec![Value::Float(45.0), Value::Null]),
            ("AttemptsMedian", vec![Value::Int(40), Value::Int(40)]),
            ("ParentTimeMedian", vec![Value::Float(45.0), Value::Float(45.0)]),
        ])
        .unwrap();

        let output = compute_statistical_metrics(&table, &StatisticalMetricsConfig::default()).unwrap();
        assert_eq!(output.num_columns(), 10);

        let accuracy = output.numeric_column("Accuracy").unwrap();
        assert!((accuracy[0].unwrap() - 0.75f64.exp()).abs() < 1e-12);
        assert_eq!(accuracy[1], None);

        let half = sigmoid(2f64.ln(), 1.0);
        let velocity = output.numeric_column("Velocity").unwrap();
        assert!((velocity[0].unwrap() - (0.75f64.exp() + 2.0 * half)).abs() < 1e-12);
        assert_eq!(velocity[1], None);
    }

    #[test]
    fn test_statistical_metrics_without_span() {
        let table = MetricsTable::from_columns(vec![
            ("Attempted", vec![Value::Int(10)]),
            ("Correct", vec![Value::Int(5)]),
            ("QuesTimeMedian", vec![Value::Float(20.0)]),
            ("ParentTimeMedian", vec![Value::Float(20.0)]),
        ])
        .unwrap();
        let config = StatisticalMetricsConfig {
            include_span: false,
            ..Default::default()
        };

        let output = compute_statistical_metrics(&table, &config).unwrap();
        assert!(!output.has_column("Span"));
        assert!(output.has_column("Velocity"));
    }
}
