//! Pricer Configuration
//!
//! Where the artifacts live and how estimates are explained.
use crate::constants::{DEFAULT_ARTIFACT_DIR, DEFAULT_REFERENCE_SAMPLES};
use crate::errors::PricerError;
use crate::regressor::ContributionsMethod;
use crate::utils::read_json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_DIR)
}
fn default_contributions_method() -> ContributionsMethod {
    ContributionsMethod::Shapley
}
fn default_reference_samples() -> usize {
    DEFAULT_REFERENCE_SAMPLES
}
fn default_seed() -> u64 {
    0
}
fn default_parallel() -> bool {
    true
}

/// Configuration for a `PricingContext`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricerConfig {
    /// Directory holding `columns.json`, `scaler.json` and `model.json`.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Attribution method for explanations.
    #[serde(default = "default_contributions_method")]
    pub contributions_method: ContributionsMethod,
    /// Number of synthetic submissions behind the global importance chart.
    #[serde(default = "default_reference_samples")]
    pub reference_samples: usize,
    /// Seed of the reference sampler.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Run batch work on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for PricerConfig {
    fn default() -> Self {
        PricerConfig {
            artifact_dir: default_artifact_dir(),
            contributions_method: default_contributions_method(),
            reference_samples: default_reference_samples(),
            seed: default_seed(),
            parallel: default_parallel(),
        }
    }
}

impl PricerConfig {
    pub fn from_json(json_str: &str) -> Result<Self, PricerError> {
        serde_json::from_str::<PricerConfig>(json_str)
            .map_err(|e| PricerError::UnableToRead("config".to_string(), e.to_string()))
    }

    /// Load a configuration from a path to a json file.
    pub fn load_config(path: &Path) -> Result<Self, PricerError> {
        read_json(path)
    }

    /// Set the artifact directory.
    pub fn set_artifact_dir(mut self, artifact_dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = artifact_dir.into();
        self
    }

    /// Set the attribution method.
    pub fn set_contributions_method(mut self, contributions_method: ContributionsMethod) -> Self {
        self.contributions_method = contributions_method;
        self
    }

    pub fn set_reference_samples(mut self, reference_samples: usize) -> Self {
        self.reference_samples = reference_samples;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = PricerConfig::from_json(r#"{"seed": 9}"#).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.artifact_dir, PathBuf::from("resources/artifacts"));
        assert_eq!(config.contributions_method, ContributionsMethod::Shapley);
        assert_eq!(config.reference_samples, 200);
        assert!(config.parallel);
        assert_eq!(PricerConfig::from_json("{}").unwrap(), PricerConfig::default());
    }

    #[test]
    fn test_setters() {
        let config = PricerConfig::default()
            .set_artifact_dir("/tmp/artifacts")
            .set_contributions_method(ContributionsMethod::Weight)
            .set_reference_samples(10)
            .set_seed(3)
            .set_parallel(false);
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/artifacts"));
        assert_eq!(config.contributions_method, ContributionsMethod::Weight);
        assert_eq!(config.reference_samples, 10);
        assert_eq!(config.seed, 3);
        assert!(!config.parallel);
    }

    #[test]
    fn test_bad_config() {
        assert!(PricerConfig::from_json(r#"{"contributions_method": "Gain"}"#).is_err());
        assert!(PricerConfig::load_config(Path::new("does/not/exist.json")).is_err());
    }
}
