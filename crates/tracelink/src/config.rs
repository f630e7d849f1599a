//! Analysis configuration.
//!
//! [`AnalysisConfig`] is an explicit value object passed to every component
//! at construction. Per-call options ([`MatrixOptions`], [`ImpactOptions`])
//! override individual fields; the merged result is validated before any
//! work starts.

use crate::domain::MatrixId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default BFS depth bound for impact analysis
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Hard ceiling on the configurable depth bound
pub const MAX_DEPTH_LIMIT: usize = 50;

/// Default minimum score for an impact to be retained
pub const DEFAULT_IMPACT_THRESHOLD: f64 = 0.3;

/// Default minimum classifier confidence for a relationship to be accepted
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Default cap on classified requirement pairs per run
pub const DEFAULT_MAX_PAIRS: usize = 100;

/// Default coverage percentage below which a gap is reported
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 80.0;

/// Default number of in-flight classifier calls
pub const DEFAULT_CLASSIFIER_CONCURRENCY: usize = 5;

/// Default per-call classifier timeout, in seconds
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 10;

/// Default retention for persisted artifacts, in days
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Default model identifier recorded in generation metadata
pub const DEFAULT_MODEL: &str = "heuristic-v1";

/// Tunables for an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalysisConfig {
    /// Maximum BFS depth for impact propagation (>= 1)
    pub max_depth: usize,

    /// Minimum impact score for an impact to be retained
    pub impact_threshold: f64,

    /// Minimum classifier confidence for a relationship to be accepted
    pub min_confidence: f64,

    /// Maximum number of requirement pairs classified per run
    pub max_pairs: usize,

    /// Coverage percentage below which `low_overall_coverage` is reported
    pub coverage_threshold: f64,

    /// Maximum concurrent classifier calls
    pub classifier_concurrency: usize,

    /// Per-call classifier timeout in seconds
    pub classifier_timeout_secs: u64,

    /// How long persisted artifacts are retained, in days
    pub retention_days: u32,

    /// Model/version identifier recorded in generation metadata
    pub model: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            impact_threshold: DEFAULT_IMPACT_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_pairs: DEFAULT_MAX_PAIRS,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            classifier_concurrency: DEFAULT_CLASSIFIER_CONCURRENCY,
            classifier_timeout_secs: DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_max_depth(self.max_depth)?;
        validate_unit_interval("impact-threshold", self.impact_threshold)?;
        validate_unit_interval("min-confidence", self.min_confidence)?;
        if self.max_pairs == 0 {
            return Err(Error::InvalidParameter(
                "max-pairs must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.coverage_threshold) {
            return Err(Error::InvalidParameter(format!(
                "coverage-threshold must be within [0, 100], got {}",
                self.coverage_threshold
            )));
        }
        if self.classifier_concurrency == 0 {
            return Err(Error::InvalidParameter(
                "classifier-concurrency must be at least 1".to_string(),
            ));
        }
        if self.classifier_timeout_secs == 0 {
            return Err(Error::InvalidParameter(
                "classifier-timeout-secs must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::InvalidParameter("model cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Per-call classifier timeout.
    #[must_use]
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_secs)
    }

    /// Retention window for persisted artifacts.
    #[must_use]
    pub fn retention_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Apply matrix-build overrides and validate the result.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the merged config is invalid.
    pub fn with_matrix_options(&self, options: &MatrixOptions) -> Result<Self> {
        let mut merged = self.clone();
        if let Some(max_pairs) = options.max_pairs {
            merged.max_pairs = max_pairs;
        }
        if let Some(min_confidence) = options.min_confidence {
            merged.min_confidence = min_confidence;
        }
        if let Some(coverage_threshold) = options.coverage_threshold {
            merged.coverage_threshold = coverage_threshold;
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Apply impact-analysis overrides and validate the result.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the merged config is invalid.
    pub fn with_impact_options(&self, options: &ImpactOptions) -> Result<Self> {
        let mut merged = self.clone();
        if let Some(max_depth) = options.max_depth {
            merged.max_depth = max_depth;
        }
        if let Some(impact_threshold) = options.impact_threshold {
            merged.impact_threshold = impact_threshold;
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Reject depth bounds below 1 or above [`MAX_DEPTH_LIMIT`].
///
/// # Errors
///
/// Returns `Error::InvalidParameter` for out-of-range depths.
pub fn validate_max_depth(max_depth: usize) -> Result<()> {
    if max_depth < 1 {
        return Err(Error::InvalidParameter(
            "max-depth must be at least 1".to_string(),
        ));
    }
    if max_depth > MAX_DEPTH_LIMIT {
        return Err(Error::InvalidParameter(format!(
            "max-depth cannot exceed {MAX_DEPTH_LIMIT}, got {max_depth}"
        )));
    }
    Ok(())
}

fn validate_unit_interval(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidParameter(format!(
            "{field} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Per-call overrides for building a traceability matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixOptions {
    /// Override for the pair cap
    pub max_pairs: Option<usize>,

    /// Override for the classifier acceptance threshold
    pub min_confidence: Option<f64>,

    /// Override for the coverage gap threshold
    pub coverage_threshold: Option<f64>,

    /// Skip merging manually curated relationships
    #[serde(default)]
    pub exclude_manual: bool,
}

/// Per-call overrides for impact analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactOptions {
    /// Matrix to analyze; defaults to the newest matrix containing the requirement
    pub matrix_id: Option<MatrixId>,

    /// Override for the BFS depth bound
    pub max_depth: Option<usize>,

    /// Override for the impact retention threshold
    pub impact_threshold: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_pairs, 100);
        assert_eq!(config.classifier_timeout(), Duration::from_secs(10));
    }

    #[rstest]
    #[case::zero_depth(AnalysisConfig { max_depth: 0, ..AnalysisConfig::default() })]
    #[case::huge_depth(AnalysisConfig { max_depth: 51, ..AnalysisConfig::default() })]
    #[case::negative_threshold(AnalysisConfig { impact_threshold: -0.1, ..AnalysisConfig::default() })]
    #[case::confidence_above_one(AnalysisConfig { min_confidence: 1.5, ..AnalysisConfig::default() })]
    #[case::zero_pairs(AnalysisConfig { max_pairs: 0, ..AnalysisConfig::default() })]
    #[case::coverage_over_100(AnalysisConfig { coverage_threshold: 101.0, ..AnalysisConfig::default() })]
    #[case::no_workers(AnalysisConfig { classifier_concurrency: 0, ..AnalysisConfig::default() })]
    #[case::no_timeout(AnalysisConfig { classifier_timeout_secs: 0, ..AnalysisConfig::default() })]
    fn invalid_configs_are_rejected(#[case] config: AnalysisConfig) {
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn impact_options_override_and_validate() {
        let base = AnalysisConfig::default();
        let merged = base
            .with_impact_options(&ImpactOptions {
                max_depth: Some(2),
                impact_threshold: Some(0.6),
                ..ImpactOptions::default()
            })
            .unwrap();
        assert_eq!(merged.max_depth, 2);
        assert!((merged.impact_threshold - 0.6).abs() < f64::EPSILON);
        // The classifier threshold is independent of the impact threshold.
        assert!((merged.min_confidence - DEFAULT_MIN_CONFIDENCE).abs() < f64::EPSILON);

        let rejected = base.with_impact_options(&ImpactOptions {
            max_depth: Some(0),
            ..ImpactOptions::default()
        });
        assert!(rejected.is_err());
    }
}
