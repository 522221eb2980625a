//! Pipeline orchestration
//!
//! This module provides the configured entry point of the engine. Each
//! method runs one stage with the settings held in [`MetricsConfig`]:
//!
//! 1. Activity metrics - accuracy, span, speed, velocity
//! 2. Difficulty - velocity z-scores binned into levels per content group
//! 3. Relative metrics - z-scores and percentile ranks per cohort
//! 4. Trends - weekly resampling and smoothing
//! 5. History - dense daily snapshots per user
//!
//! The engine holds no state besides its configuration, so one instance can
//! serve any number of calls.

use crate::activity::compute_statistical_metrics;
use crate::config::MetricsConfig;
use crate::difficulty::categorize_questions_on_difficulty;
use crate::error::ComputeError;
use crate::gap_fill::fill_metrics_history_gaps;
use crate::normalizer::calculate_column_z_scores;
use crate::ranker::calculate_column_percentiles;
use crate::relative::{
    categorize_metrics, compute_relative_content_metrics, compute_relative_user_metrics,
    compute_score_and_rank,
};
use crate::smoother::smoothen_trend_data;
use crate::table::MetricsTable;

/// Configured metrics engine
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: MetricsConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine from a JSON configuration document
    pub fn from_json_config(json: &str) -> Result<Self, ComputeError> {
        Ok(Self {
            config: MetricsConfig::from_json(json)?,
        })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Append `Accuracy`, `Span`, `Speed` and `Velocity`
    pub fn statistical_metrics(&self, table: &MetricsTable) -> Result<MetricsTable, ComputeError> {
        compute_statistical_metrics(table, &self.config.statistical)
    }

    /// Append velocity z-scores and difficulty levels
    pub fn difficulty(&self, questions: &MetricsTable) -> Result<MetricsTable, ComputeError> {
        categorize_questions_on_difficulty(questions, &self.config.difficulty)
    }

    /// Activity metrics followed by difficulty levels
    pub fn question_metrics(&self, questions: &MetricsTable) -> Result<MetricsTable, ComputeError> {
        let with_velocity = self.statistical_metrics(questions)?;
        self.difficulty(&with_velocity)
    }

    /// Z-scores of one column within groups, using the configured options
    pub fn z_scores(
        &self,
        table: &MetricsTable,
        group_columns: &[&str],
        score_column: &str,
        output_column: Option<&str>,
    ) -> Result<MetricsTable, ComputeError> {
        calculate_column_z_scores(
            table,
            group_columns,
            score_column,
            output_column,
            &self.config.z_score,
        )
    }

    /// Percentile ranks of one column within groups
    pub fn percentiles(
        &self,
        table: &MetricsTable,
        group_columns: &[&str],
        score_column: &str,
        output_column: Option<&str>,
    ) -> Result<MetricsTable, ComputeError> {
        calculate_column_percentiles(table, group_columns, score_column, output_column)
    }

    pub fn score_and_rank(
        &self,
        table: &MetricsTable,
        metric_columns: &[&str],
        group_columns: &[&str],
    ) -> Result<MetricsTable, ComputeError> {
        compute_score_and_rank(table, metric_columns, group_columns, &self.config.suffixes)
    }

    pub fn relative_user_metrics(
        &self,
        absolute: &MetricsTable,
        group_columns: &[&str],
        user_metrics: &[&str],
    ) -> Result<MetricsTable, ComputeError> {
        compute_relative_user_metrics(
            absolute,
            group_columns,
            user_metrics,
            &self.config.history.user_column,
            &self.config.suffixes,
        )
    }

    pub fn relative_content_metrics(
        &self,
        absolute: &MetricsTable,
        group_columns: &[&str],
        content_metrics: &[&str],
    ) -> Result<MetricsTable, ComputeError> {
        compute_relative_content_metrics(
            absolute,
            group_columns,
            content_metrics,
            &self.config.suffixes,
        )
    }

    /// Bin score and rank columns using the configured metric cuts
    pub fn categorize(&self, table: &MetricsTable) -> Result<MetricsTable, ComputeError> {
        categorize_metrics(table, &self.config.metric_cuts, &self.config.suffixes)
    }

    pub fn smooth_trend(
        &self,
        table: &MetricsTable,
        metric_columns: &[&str],
        date_column: &str,
    ) -> Result<MetricsTable, ComputeError> {
        smoothen_trend_data(table, metric_columns, date_column, &self.config.smoothing)
    }

    pub fn fill_history_gaps(
        &self,
        history: &MetricsTable,
        category_columns: &[&str],
        metrics_columns: Option<&[&str]>,
    ) -> Result<MetricsTable, ComputeError> {
        fill_metrics_history_gaps(
            history,
            category_columns,
            metrics_columns,
            &self.config.history,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DifficultyLabel, Value};

    fn sample_questions_json() -> &'static str {
        r#"{
            "columns": ["CourseChapterId", "QuestionId", "Attempted", "Correct",
                        "QuesTimeMedian", "AttemptsMedian", "ParentTimeMedian"],
            "data": [
                [1, 101, 120, 100, 40.0, 80, 60.0],
                [1, 102, 80, 30, 95.0, 80, 60.0],
                [1, 103, 60, 45, 60.0, 80, 60.0],
                [1, 104, 5, 5, 20.0, 80, 60.0],
                [2, 201, 200, 50, 150.0, 150, 90.0],
                [2, 202, 150, 140, 45.0, 150, 90.0],
                [2, 203, 0, 0, null, 150, 90.0]
            ]
        }"#
    }

    #[test]
    fn test_question_metrics() {
        let config = MetricsConfig::from_json(
            r#"{ "statistical": { "guard": { "check_count": true, "min_count": 20 } } }"#,
        )
        .unwrap();
        let engine = MetricsEngine::with_config(config).unwrap();
        let questions = MetricsTable::from_json(sample_questions_json()).unwrap();

        let output = engine.question_metrics(&questions).unwrap();

        assert_eq!(output.num_rows(), 7);
        for column in ["Accuracy", "Span", "Speed", "Velocity", "VelocityZScore", "DifficultyLevel"] {
            assert!(output.has_column(column), "missing {}", column);
        }

        let velocity = output.numeric_column("Velocity").unwrap();
        // Too few attempts (104) and no attempts at all (203)
        assert_eq!(velocity[3], None);
        assert_eq!(velocity[6], None);

        let levels = output.column("DifficultyLevel").unwrap();
        assert!(levels[3].is_null());
        assert!(levels[6].is_null());
        for level in levels.iter().filter(|l| !l.is_null()) {
            assert!(DifficultyLabel::parse(level.as_str().unwrap()).is_some());
        }

        // Within chapter 1, the accurate fast question is easier than the slow one
        let easy = DifficultyLabel::parse(levels[0].as_str().unwrap()).unwrap();
        let hard = DifficultyLabel::parse(levels[1].as_str().unwrap()).unwrap();
        assert!(easy < hard);
    }

    #[test]
    fn test_relative_and_categorize() {
        let engine = MetricsEngine::from_json_config(
            r#"{ "metric_cuts": { "Accuracy": { "rank": { "cuts": [0, 0.5, 1], "labels": ["Low", "High"] } } } }"#,
        )
        .unwrap();
        let table = MetricsTable::from_columns(vec![
            ("UserId", vec![Value::Int(1), Value::Int(2)]),
            ("ChapterId", vec![Value::Int(1), Value::Int(1)]),
            ("Accuracy", vec![Value::Float(0.9), Value::Float(0.3)]),
        ])
        .unwrap();

        let relative = engine
            .relative_user_metrics(&table, &["ChapterId"], &["Accuracy"])
            .unwrap();
        let output = engine.categorize(&relative).unwrap();

        assert_eq!(
            output.column("AccuracyRankLevel").unwrap(),
            &[Value::from("Low"), Value::from("High")]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MetricsConfig::default();
        config.smoothing.max_window = 0;
        assert!(MetricsEngine::with_config(config).is_err());
    }
}
