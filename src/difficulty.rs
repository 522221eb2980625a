//! Question difficulty categorization
//!
//! Questions are bucketed into difficulty levels within their content group
//! (by default the chapter). The z-score of the log of `Velocity` is the
//! difficulty indicator: lower velocity means a harder question.

use crate::error::ComputeError;
use crate::normalizer::{grouped_z_scores, sort_order, ZScoreOptions};
use crate::table::MetricsTable;
use crate::types::BinSpec;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Column names and bins for [`categorize_questions_on_difficulty`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Content group within which questions are compared
    pub group_columns: Vec<String>,
    pub velocity_column: String,
    /// Output column for the velocity z-score
    pub score_column: String,
    /// Output column for the difficulty label
    pub level_column: String,
    pub bins: BinSpec,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            group_columns: vec!["CourseChapterId".to_string()],
            velocity_column: "Velocity".to_string(),
            score_column: "VelocityZScore".to_string(),
            level_column: "DifficultyLevel".to_string(),
            bins: BinSpec::difficulty(),
        }
    }
}

/// Append velocity z-scores and difficulty labels to a question table.
///
/// Each group's velocities are log-transformed and standardized, then binned
/// with `config.bins`. Rows keep their input order. A group containing a
/// non-positive velocity gets null scores and labels.
pub fn categorize_questions_on_difficulty(
    questions: &MetricsTable,
    config: &DifficultyConfig,
) -> Result<MetricsTable, ComputeError> {
    config.bins.validate()?;
    let group_columns: Vec<&str> = config.group_columns.iter().map(String::as_str).collect();

    let order = sort_order(questions, &group_columns, &config.velocity_column)?;
    let scores = grouped_z_scores(
        questions,
        &order,
        &group_columns,
        &config.velocity_column,
        &ZScoreOptions::log_transformed(),
    )?;
    let levels = config.bins.bin(&scores);

    debug!(
        questions = questions.num_rows(),
        labelled = levels.iter().filter(|l| !l.is_null()).count(),
        "categorized questions on difficulty"
    );

    questions
        .clone()
        .with_numeric_column(config.score_column.as_str(), &scores)?
        .with_column(config.level_column.as_str(), levels)
}
