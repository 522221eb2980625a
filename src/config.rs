//! Engine configuration
//!
//! Every setting has a default, so a JSON document only needs the fields it
//! overrides:
//!
//! ```json
//! { "statistical": { "guard": { "check_count": true, "min_count": 10 } },
//!   "smoothing": { "max_window": 15 } }
//! ```

use crate::activity::StatisticalMetricsConfig;
use crate::difficulty::DifficultyConfig;
use crate::error::ComputeError;
use crate::gap_fill::HistoryKeys;
use crate::normalizer::ZScoreOptions;
use crate::relative::{MetricCuts, SuffixConfig};
use crate::smoother::SmoothingOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete configuration for a [`crate::MetricsEngine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub statistical: StatisticalMetricsConfig,
    /// Options for ad-hoc column z-scores
    pub z_score: ZScoreOptions,
    pub difficulty: DifficultyConfig,
    pub smoothing: SmoothingOptions,
    pub history: HistoryKeys,
    pub suffixes: SuffixConfig,
    /// Level bins per metric, applied by `categorize_metrics`
    pub metric_cuts: BTreeMap<String, MetricCuts>,
}

impl MetricsConfig {
    /// Load configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check settings that would otherwise only fail mid-computation
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.difficulty.bins.validate()?;
        for cuts in self.metric_cuts.values() {
            if let Some(score) = &cuts.score {
                score.validate()?;
            }
            if let Some(rank) = &cuts.rank {
                rank.validate()?;
            }
        }
        if self.z_score.lower_limit >= self.z_score.upper_limit {
            return Err(ComputeError::InvalidArgument(format!(
                "z-score range [{}, {}] is empty",
                self.z_score.lower_limit, self.z_score.upper_limit
            )));
        }
        if self.smoothing.max_window == 0 {
            return Err(ComputeError::InvalidArgument(
                "smoothing max_window must be at least 1".to_string(),
            ));
        }
        if self.smoothing.weekly_after_weeks < 0 {
            return Err(ComputeError::InvalidArgument(format!(
                "smoothing weekly_after_weeks must not be negative, got {}",
                self.smoothing.weekly_after_weeks
            )));
        }
        Ok(())
    }
}
