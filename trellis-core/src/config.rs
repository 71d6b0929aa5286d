//! Engine configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load an [`EngineConfig`].
#[derive(Debug, Error)]
#[error("invalid engine configuration: {0}")]
pub struct ConfigError(#[from] serde_json::Error);

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Bound on recursive inverse planning. Deeper requests are rejected.
    pub max_inverse_depth: usize,
    pub sampling: SamplingConfig,
    pub warn_unknown_attributes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inverse_depth: 64,
            sampling: SamplingConfig::default(),
            warn_unknown_attributes: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Tuning for the variant sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplingConfig {
    /// Acceptable probability that rejection sampling runs out of attempts.
    pub failure_probability: f64,
    /// Hard cap on rejection attempts regardless of the computed bound.
    pub max_rejection_attempts: usize,
    /// Rejection rate above which the sampler enumerates eligible values.
    pub rejection_threshold: f64,
    /// Estimated rates within this distance of the threshold are confirmed
    /// by counting eligible values exactly.
    pub ambiguity_threshold: f64,
    /// Largest variant space that is indexed exactly.
    pub max_unique_variants: u64,
    /// Whole-selection retries when enforcing coprimality.
    pub coprime_attempts: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            failure_probability: 1e-12,
            max_rejection_attempts: 100_000,
            rejection_threshold: 0.5,
            ambiguity_threshold: 0.25,
            max_unique_variants: 1_000_000,
            coprime_attempts: 10_000,
        }
    }
}

impl SamplingConfig {
    /// Number of draws needed so that a draw rejected with probability
    /// `rejection_rate` exhausts them with probability below
    /// `failure_probability`.
    pub fn rejection_bound(&self, rejection_rate: f64) -> usize {
        if rejection_rate <= 0.0 {
            return 1;
        }
        if rejection_rate >= 1.0 {
            return self.max_rejection_attempts;
        }
        let bound = (self.failure_probability.ln() / rejection_rate.ln()).ceil();
        (bound.max(1.0) as usize).min(self.max_rejection_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_nested_fields() {
        let config =
            EngineConfig::from_json(r#"{"maxInverseDepth": 3, "sampling": {"coprimeAttempts": 5}}"#)
                .unwrap();
        assert_eq!(config.max_inverse_depth, 3);
        assert_eq!(config.sampling.coprime_attempts, 5);
        assert_eq!(config.sampling.rejection_threshold, 0.5);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(EngineConfig::from_json("{\"maxInverseDepth\": \"x\"}").is_err());
    }

    #[test]
    fn rejection_bound_grows_with_rate() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.rejection_bound(0.0), 1);
        let low = sampling.rejection_bound(0.1);
        let high = sampling.rejection_bound(0.5);
        assert!(low < high);
        // 0.5^40 < 1e-12
        assert_eq!(high, 40);
        assert_eq!(sampling.rejection_bound(1.0), sampling.max_rejection_attempts);
    }
}
