//! Standard Scaler
//!
//! Pre-fit per-column standardization, `(x - mean) / scale`, applied to every
//! row before it reaches the regressor.
use crate::errors::PricerError;
use crate::utils::read_json;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A fitted standard scaler.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StandardScaler {
    /// Per column mean seen at fit time.
    pub mean: Vec<f64>,
    /// Per column standard deviation. A zero scale leaves the centered value as is.
    pub scale: Vec<f64>,
    /// Column names the scaler was fit on, when shipped with the artifact.
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, PricerError> {
        let scaler = StandardScaler {
            mean,
            scale,
            feature_names: None,
        };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Identity scaling over `n_features` columns.
    pub fn identity(n_features: usize) -> Self {
        StandardScaler {
            mean: vec![0.0; n_features],
            scale: vec![1.0; n_features],
            feature_names: None,
        }
    }

    pub fn validate(&self) -> Result<(), PricerError> {
        if self.mean.len() != self.scale.len() {
            return Err(PricerError::DimensionMismatch(
                "Scaler scale".to_string(),
                self.mean.len(),
                self.scale.len(),
            ));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.mean.len() {
                return Err(PricerError::DimensionMismatch(
                    "Scaler feature names".to_string(),
                    self.mean.len(),
                    names.len(),
                ));
            }
        }
        if let Some(i) = (0..self.mean.len()).find(|&i| !self.mean[i].is_finite() || !self.scale[i].is_finite()) {
            return Err(PricerError::ModelService(format!("scaler column {} is not finite", i)));
        }
        if let Some(i) = self.scale.iter().position(|s| *s < 0.0) {
            return Err(PricerError::ModelService(format!("scaler column {} has a negative scale", i)));
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a row. The row must have exactly the fitted width.
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>, PricerError> {
        if row.len() != self.mean.len() {
            return Err(PricerError::DimensionMismatch(
                "Scaler".to_string(),
                self.mean.len(),
                row.len(),
            ));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (m, s))| if *s == 0.0 { x - m } else { (x - m) / s })
            .collect())
    }

    pub fn from_json(json_str: &str) -> Result<Self, PricerError> {
        let scaler = serde_json::from_str::<StandardScaler>(json_str)
            .map_err(|e| PricerError::UnableToRead("scaler".to_string(), e.to_string()))?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// Load a scaler from a path to a json file.
    pub fn load_scaler(path: &Path) -> Result<Self, PricerError> {
        let scaler: StandardScaler = read_json(path)?;
        scaler.validate()?;
        let constant = scaler.scale.iter().filter(|s| **s == 0.0).count();
        if constant > 0 {
            warn!("Scaler from {} has {} constant columns, they are only centered.", path.display(), constant);
        }
        info!("Loaded scaler from {} over {} features.", path.display(), scaler.n_features());
        Ok(scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let scaler = StandardScaler::new(vec![10.0, 0.5, 2.0], vec![2.0, 0.5, 0.0]).unwrap();
        let scaled = scaler.transform(&[14.0, 0.0, 3.0]).unwrap();
        assert_eq!(scaled, vec![2.0, -1.0, 1.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = StandardScaler::identity(3);
        assert!(matches!(
            scaler.transform(&[1.0, 2.0]),
            Err(PricerError::DimensionMismatch(_, 3, 2))
        ));
        assert!(StandardScaler::new(vec![0.0; 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_invalid_scaler_rejected() {
        assert!(StandardScaler::new(vec![f64::NAN], vec![1.0]).is_err());
        assert!(StandardScaler::new(vec![0.0], vec![-1.0]).is_err());
    }

    #[test]
    fn test_from_json() {
        let scaler = StandardScaler::from_json(r#"{"mean": [1.0, 2.0], "scale": [1.0, 4.0]}"#).unwrap();
        assert_eq!(scaler.feature_names, None);
        assert_eq!(scaler.transform(&[1.0, 10.0]).unwrap(), vec![0.0, 2.0]);

        let named = r#"{"mean": [1.0, 2.0], "scale": [1.0, 4.0], "feature_names": ["a"]}"#;
        assert!(StandardScaler::from_json(named).is_err());
    }
}
