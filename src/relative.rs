//! Relative metrics
//!
//! Absolute metrics (accuracy, speed, velocity...) are only comparable inside
//! a cohort. This module adds a z-score and a percentile rank column for each
//! metric within its group, and turns those columns into named levels.

use crate::error::ComputeError;
use crate::normalizer::{calculate_column_z_scores, ZScoreOptions};
use crate::ranker::calculate_column_percentiles;
use crate::table::MetricsTable;
use crate::types::{BinSpec, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column flagging metrics inherited from a parent content unit
pub const PARENT_METRIC_COLUMN: &str = "IsParentMetric";

pub const VELOCITY_COLUMN: &str = "Velocity";

/// Negated velocity: higher means harder
pub const DIFFICULTY_COLUMN: &str = "Difficulty";

/// Suffixes appended to a metric name to name its derived columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuffixConfig {
    pub score: String,
    pub rank: String,
    pub score_cut: String,
    pub rank_cut: String,
}

impl Default for SuffixConfig {
    fn default() -> Self {
        Self {
            score: "Score".to_string(),
            rank: "Rank".to_string(),
            score_cut: "ScoreLevel".to_string(),
            rank_cut: "RankLevel".to_string(),
        }
    }
}

impl SuffixConfig {
    pub fn score_column(&self, metric: &str) -> String {
        format!("{}{}", upper_first(metric), self.score)
    }

    pub fn rank_column(&self, metric: &str) -> String {
        format!("{}{}", upper_first(metric), self.rank)
    }

    pub fn score_cut_column(&self, metric: &str) -> String {
        format!("{}{}", upper_first(metric), self.score_cut)
    }

    pub fn rank_cut_column(&self, metric: &str) -> String {
        format!("{}{}", upper_first(metric), self.rank_cut)
    }
}

/// Bins applied to a metric's score and/or rank column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricCuts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<BinSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<BinSpec>,
}

/// Add a z-score and a percentile rank column for every metric.
///
/// Z-scores are plain (no scaling, no log). Both are computed within
/// `group_columns`; the table comes back sorted by the groups.
pub fn compute_score_and_rank(
    table: &MetricsTable,
    metric_columns: &[&str],
    group_columns: &[&str],
    suffixes: &SuffixConfig,
) -> Result<MetricsTable, ComputeError> {
    let mut output = table.clone();
    for metric in metric_columns {
        output = calculate_column_z_scores(
            &output,
            group_columns,
            metric,
            Some(suffixes.score_column(metric).as_str()),
            &ZScoreOptions::default(),
        )?;
        output = calculate_column_percentiles(
            &output,
            group_columns,
            metric,
            Some(suffixes.rank_column(metric).as_str()),
        )?;
    }
    Ok(output)
}

/// Score and rank each user's metrics against the other users of a group.
///
/// Rows flagged as parent metrics are dropped first, and only the user,
/// group and metric columns are kept.
pub fn compute_relative_user_metrics(
    absolute: &MetricsTable,
    group_columns: &[&str],
    user_metrics: &[&str],
    user_column: &str,
    suffixes: &SuffixConfig,
) -> Result<MetricsTable, ComputeError> {
    let own_metrics = if absolute.has_column(PARENT_METRIC_COLUMN) {
        let flags = absolute.column(PARENT_METRIC_COLUMN)?;
        absolute.filter_rows(|i| flags[i].as_f64() == Some(0.0))
    } else {
        absolute.clone()
    };

    let mut columns = vec![user_column];
    columns.extend_from_slice(group_columns);
    columns.extend_from_slice(user_metrics);
    let relative = own_metrics.select(&columns)?;

    compute_score_and_rank(&relative, user_metrics, group_columns, suffixes)
}

/// Score and rank content units (chapters, KSCs...) within their group.
///
/// `Velocity` is renamed to `Difficulty` and negated, so that a higher
/// difficulty score means a harder content unit.
pub fn compute_relative_content_metrics(
    absolute: &MetricsTable,
    group_columns: &[&str],
    content_metrics: &[&str],
    suffixes: &SuffixConfig,
) -> Result<MetricsTable, ComputeError> {
    let renamed = if absolute.has_column(VELOCITY_COLUMN) {
        absolute.clone().rename_column(VELOCITY_COLUMN, DIFFICULTY_COLUMN)?
    } else {
        absolute.clone()
    };

    let difficulty: Vec<Option<f64>> = renamed
        .numeric_column(DIFFICULTY_COLUMN)?
        .into_iter()
        .map(|v| v.map(|x| -x))
        .collect();
    let relative = renamed.with_numeric_column(DIFFICULTY_COLUMN, &difficulty)?;

    compute_score_and_rank(&relative, content_metrics, group_columns, suffixes)
}

/// Turn score and rank columns into named levels.
///
/// For every metric in `cuts`, each configured bin spec is applied to the
/// metric's score or rank column and written to the matching cut column.
/// Metrics whose source column is absent are skipped.
pub fn categorize_metrics(
    table: &MetricsTable,
    cuts: &BTreeMap<String, MetricCuts>,
    suffixes: &SuffixConfig,
) -> Result<MetricsTable, ComputeError> {
    let mut output = table.clone();
    for (metric, metric_cuts) in cuts {
        let specs = [
            (
                &metric_cuts.score,
                suffixes.score_column(metric),
                suffixes.score_cut_column(metric),
            ),
            (
                &metric_cuts.rank,
                suffixes.rank_column(metric),
                suffixes.rank_cut_column(metric),
            ),
        ];
        for (spec, source, target) in specs {
            let Some(spec) = spec else { continue };
            if !output.has_column(&source) {
                continue;
            }
            spec.validate()?;
            let levels: Vec<Value> = spec.bin(&output.numeric_column(&source)?);
            output = output.with_column(target, levels)?;
        }
    }
    Ok(output)
}

/// Upper-case the first character, keeping the rest
fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user_metrics() -> MetricsTable {
        MetricsTable::from_columns(vec![
            ("UserId", vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
            ("ChapterId", vec![Value::Int(5); 4]),
            (
                "Accuracy",
                vec![Value::Float(0.2), Value::Float(0.6), Value::Float(0.4), Value::Float(0.9)],
            ),
            (PARENT_METRIC_COLUMN, vec![Value::Int(0), Value::Int(0), Value::Int(0), Value::Int(1)]),
            ("Extra", vec![Value::from("x"); 4]),
        ])
        .unwrap()
    }

    #[test]
    fn test_suffix_names() {
        let suffixes = SuffixConfig::default();
        assert_eq!(suffixes.score_column("accuracy"), "AccuracyScore");
        assert_eq!(suffixes.rank_column("avgTimeTaken"), "AvgTimeTakenRank");
        assert_eq!(suffixes.score_cut_column("Velocity"), "VelocityScoreLevel");
        assert_eq!(suffixes.rank_cut_column(""), "RankLevel");
    }

    #[test]
    fn test_relative_user_metrics() {
        let output = compute_relative_user_metrics(
            &user_metrics(),
            &["ChapterId"],
            &["Accuracy"],
            "UserId",
            &SuffixConfig::default(),
        )
        .unwrap();

        assert_eq!(
            output.column_names(),
            vec!["UserId", "ChapterId", "Accuracy", "AccuracyScore", "AccuracyRank"]
        );
        // Parent-metric row (user 4) is gone; sorted by accuracy
        assert_eq!(
            output.column("UserId").unwrap(),
            &[Value::Int(1), Value::Int(3), Value::Int(2)]
        );
        let ranks = output.numeric_column("AccuracyRank").unwrap();
        assert!((ranks[0].unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(ranks[2], Some(1.0));

        let scores = output.numeric_column("AccuracyScore").unwrap();
        assert!(scores[1].unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_relative_content_metrics_negates_velocity() {
        let table = MetricsTable::from_columns(vec![
            ("SubjectId", vec![Value::Int(1); 3]),
            ("ChapterId", vec![Value::Int(10), Value::Int(11), Value::Int(12)]),
            ("Velocity", vec![Value::Float(3.0), Value::Float(1.0), Value::Float(2.0)]),
        ])
        .unwrap();

        let output = compute_relative_content_metrics(
            &table,
            &["SubjectId"],
            &["Difficulty"],
            &SuffixConfig::default(),
        )
        .unwrap();

        assert!(!output.has_column("Velocity"));
        // The slowest chapter (11) is the hardest
        assert_eq!(
            output.column("ChapterId").unwrap(),
            &[Value::Int(10), Value::Int(12), Value::Int(11)]
        );
        assert_eq!(
            output.numeric_column("Difficulty").unwrap(),
            vec![Some(-3.0), Some(-2.0), Some(-1.0)]
        );
        assert_eq!(output.numeric_column("DifficultyRank").unwrap()[2], Some(1.0));
    }

    #[test]
    fn test_relative_content_metrics_requires_velocity() {
        let table = MetricsTable::from_columns(vec![("SubjectId", vec![Value::Int(1)])]).unwrap();
        let result =
            compute_relative_content_metrics(&table, &["SubjectId"], &[], &SuffixConfig::default());
        assert!(matches!(result, Err(ComputeError::ColumnNotFound(_))));
    }

    #[test]
    fn test_categorize_metrics() {
        let suffixes = SuffixConfig::default();
        let scored = compute_score_and_rank(&user_metrics(), &["Accuracy"], &["ChapterId"], &suffixes)
            .unwrap();

        let mut cuts = BTreeMap::new();
        cuts.insert(
            "Accuracy".to_string(),
            MetricCuts {
                score: None,
                rank: Some(
                    BinSpec::new(
                        vec![0.0, 0.5, 1.0],
                        vec!["Bottom".to_string(), "Top".to_string()],
                    )
                    .unwrap(),
                ),
            },
        );
        cuts.insert(
            "Speed".to_string(),
            MetricCuts {
                score: Some(BinSpec::difficulty()),
                rank: None,
            },
        );

        let output = categorize_metrics(&scored, &cuts, &suffixes).unwrap();
        assert!(!output.has_column("AccuracyScoreLevel"));
        assert!(!output.has_column("SpeedScoreLevel"));
        assert_eq!(
            output.column("AccuracyRankLevel").unwrap(),
            &[
                Value::from("Bottom"),
                Value::from("Bottom"),
                Value::from("Top"),
                Value::from("Top"),
            ]
        );
    }
}
