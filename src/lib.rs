//! KSC Metrics - statistical metrics engine for exam-question analytics
//!
//! The engine scores and ranks learner and question performance across a
//! content hierarchy (course → class → subject → chapter → KSC → question).
//! It works on in-memory tables and never mutates its input: every transform
//! returns a new table with derived columns appended.
//!
//! ## Modules
//!
//! - **Activity**: accuracy, span, speed and velocity from raw counters
//! - **Normalizer / Ranker**: z-scores and percentile ranks within cohorts
//! - **Difficulty**: five difficulty levels per content group
//! - **Relative**: score, rank and level columns for many metrics at once
//! - **Smoother**: weekly resampling and Savitzky–Golay smoothing of trends
//! - **Gap fill**: dense daily metric history per user

pub mod activity;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod gap_fill;
pub mod normalizer;
pub mod pipeline;
pub mod ranker;
pub mod relative;
pub mod smoother;
pub mod table;
pub mod types;

pub use activity::{
    compute_accuracy, compute_ratio, compute_span, compute_speed, compute_statistical_metrics,
    compute_velocity, sigmoid, CountGuard, StatisticalMetricsConfig,
};
pub use config::MetricsConfig;
pub use difficulty::{categorize_questions_on_difficulty, DifficultyConfig};
pub use error::ComputeError;
pub use gap_fill::{fill_metrics_history_gaps, HistoryKeys};
pub use normalizer::{calculate_column_z_scores, calculate_z_scores, ZScoreOptions};
pub use pipeline::MetricsEngine;
pub use ranker::{calculate_column_percentiles, percentile_ranks};
pub use relative::{
    categorize_metrics, compute_relative_content_metrics, compute_relative_user_metrics,
    compute_score_and_rank, MetricCuts, SuffixConfig,
};
pub use smoother::{smoothen_trend_data, SmoothingOptions};
pub use table::MetricsTable;
pub use types::{BinSpec, DifficultyLabel, Value};

/// Engine version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported by the command-line tool
pub const ENGINE_NAME: &str = "ksc-metrics";
