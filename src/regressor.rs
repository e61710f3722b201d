//! Tree Ensemble Regressor
//!
//! A pre-trained additive ensemble of regression trees, loaded from JSON.
//! The crate never fits or mutates it; it only predicts and attributes.
use crate::errors::PricerError;
use crate::shapley::predict_contributions_row_shapley;
use crate::tree::Tree;
use crate::utils::read_json;
use hashbrown::HashMap;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Methods for calculating feature contributions.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ContributionsMethod {
    /// Saabas-style contributions using internal node weights.
    Weight,
    /// Internal node averages (equivalent to XGBoost's `approx_contribs`).
    Average,
    /// Exact tree-SHAP values.
    #[default]
    Shapley,
}

impl FromStr for ContributionsMethod {
    type Err = PricerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Weight" | "weight" => Ok(ContributionsMethod::Weight),
            "Average" | "average" => Ok(ContributionsMethod::Average),
            "Shapley" | "shapley" => Ok(ContributionsMethod::Shapley),
            _ => Err(PricerError::ParseString(
                s.to_string(),
                "ContributionsMethod".to_string(),
                "Weight, Average, Shapley".to_string(),
            )),
        }
    }
}

fn default_missing() -> f64 {
    f64::NAN
}

fn parse_missing<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(d).map(|x: Option<_>| x.unwrap_or(f64::NAN))
}

/// Tree ensemble regressor object
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TreeEnsembleRegressor {
    /// The initial prediction value of the model, added to the sum of tree outputs.
    pub base_score: f64,
    /// Width of the rows the model was fit on.
    pub n_features: usize,
    /// Value to consider missing.
    #[serde(default = "default_missing", deserialize_with = "parse_missing")]
    pub missing: f64,
    pub trees: Vec<Tree>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl TreeEnsembleRegressor {
    /// Build a regressor from already fitted trees.
    ///
    /// * `base_score` - Initial prediction value.
    /// * `n_features` - Width of the rows the trees were fit on.
    /// * `trees` - The fitted trees.
    pub fn new(base_score: f64, n_features: usize, trees: Vec<Tree>) -> Result<Self, PricerError> {
        let model = TreeEnsembleRegressor {
            base_score,
            n_features,
            missing: f64::NAN,
            trees,
            metadata: HashMap::new(),
        };
        model.validate()?;
        Ok(model)
    }

    /// Check every tree against the model width.
    pub fn validate(&self) -> Result<(), PricerError> {
        if !self.base_score.is_finite() {
            return Err(PricerError::ModelService(format!(
                "base score {} is not finite",
                self.base_score
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| match e {
                PricerError::ModelService(msg) => PricerError::ModelService(format!("tree {}: {}", i, msg)),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Get reference to the trees
    pub fn get_prediction_trees(&self) -> &[Tree] {
        &self.trees
    }

    fn check_width(&self, row: &[f64]) -> Result<(), PricerError> {
        if row.len() != self.n_features {
            return Err(PricerError::DimensionMismatch(
                "Regressor".to_string(),
                self.n_features,
                row.len(),
            ));
        }
        Ok(())
    }

    /// Predict a single row.
    pub fn predict_row(&self, row: &[f64]) -> Result<f64, PricerError> {
        self.check_width(row)?;
        Ok(self
            .trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.predict_row(row, &self.missing)))
    }

    /// Predict many rows.
    ///
    /// * `rows` - Rows of model width.
    /// * `parallel` - Predict in parallel.
    pub fn predict(&self, rows: &[Vec<f64>], parallel: bool) -> Result<Vec<f64>, PricerError> {
        if parallel {
            rows.par_iter().map(|r| self.predict_row(r)).collect()
        } else {
            rows.iter().map(|r| self.predict_row(r)).collect()
        }
    }

    /// Contributions of every feature to the prediction of `row`, followed by the bias.
    ///
    /// For `Average` and `Shapley` the bias plus the contributions sum to the prediction.
    pub fn predict_contributions_row(&self, row: &[f64], method: ContributionsMethod) -> Result<Vec<f64>, PricerError> {
        self.check_width(row)?;
        match method {
            ContributionsMethod::Average => {
                let weights = self.leaf_weights();
                Ok(self.contributions_average(row, &weights))
            }
            _ => Ok(self.contributions_tree_alone(row, method)),
        }
    }

    /// Contributions for many rows, one vector of `n_features + 1` per row.
    pub fn predict_contributions(
        &self,
        rows: &[Vec<f64>],
        method: ContributionsMethod,
        parallel: bool,
    ) -> Result<Vec<Vec<f64>>, PricerError> {
        for row in rows {
            self.check_width(row)?;
        }
        let weights = match method {
            ContributionsMethod::Average => self.leaf_weights(),
            _ => Vec::new(),
        };
        let row_fn = |row: &Vec<f64>| match method {
            ContributionsMethod::Average => self.contributions_average(row, &weights),
            _ => self.contributions_tree_alone(row, method),
        };
        if parallel {
            Ok(rows.par_iter().map(row_fn).collect())
        } else {
            Ok(rows.iter().map(row_fn).collect())
        }
    }

    fn leaf_weights(&self) -> Vec<HashMap<usize, f64>> {
        self.trees.iter().map(|t| t.distribute_leaf_weights()).collect()
    }

    fn contributions_average(&self, row: &[f64], weights: &[HashMap<usize, f64>]) -> Vec<f64> {
        let mut contribs = vec![0.0; self.n_features + 1];
        contribs[self.n_features] += self.base_score;
        self.trees
            .iter()
            .zip(weights.iter())
            .for_each(|(t, w)| t.predict_contributions_row_average(row, &mut contribs, w, &self.missing));
        contribs
    }

    // Methods that only need the trees themselves share this dispatch.
    fn contributions_tree_alone(&self, row: &[f64], method: ContributionsMethod) -> Vec<f64> {
        let row_fn = match method {
            ContributionsMethod::Weight => Tree::predict_contributions_row_weight,
            _ => predict_contributions_row_shapley,
        };
        let mut contribs = vec![0.0; self.n_features + 1];
        contribs[self.n_features] += self.base_score;
        self.trees
            .iter()
            .for_each(|t| row_fn(t, row, &mut contribs, &self.missing));
        contribs
    }

    /// Save the regressor as a json object to a file.
    pub fn save_model(&self, path: &Path) -> Result<(), PricerError> {
        let model = self.json_dump()?;
        fs::write(path, model).map_err(|e| PricerError::UnableToWrite(e.to_string()))
    }

    /// Dump the regressor as a json object
    pub fn json_dump(&self) -> Result<String, PricerError> {
        serde_json::to_string(self).map_err(|e| PricerError::UnableToWrite(e.to_string()))
    }

    /// Load a regressor from a json string, validating its trees.
    pub fn from_json(json_str: &str) -> Result<Self, PricerError> {
        let model = serde_json::from_str::<TreeEnsembleRegressor>(json_str)
            .map_err(|e| PricerError::UnableToRead("model".to_string(), e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Load a regressor from a path to a json model file.
    pub fn load_model(path: &Path) -> Result<Self, PricerError> {
        let model: TreeEnsembleRegressor = read_json(path)?;
        model.validate()?;
        info!(
            "Loaded regressor from {} with {} trees over {} features.",
            path.display(),
            model.trees.len(),
            model.n_features
        );
        Ok(model)
    }

    /// Insert metadata
    pub fn insert_metadata(&mut self, key: String, value: String) {
        self.metadata.insert(key, value);
    }

    /// Get Metadata
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::tree::tests::small_tree;
    use approx::assert_relative_eq;

    fn stump(feature: usize, weights: (f32, f32)) -> Tree {
        Tree::from_nodes(vec![
            Node::split(0, (weights.0 + weights.1) / 2.0, 2.0, feature, 0.5, 1, 2, None),
            Node::leaf(1, weights.0, 1.0),
            Node::leaf(2, weights.1, 1.0),
        ])
    }

    fn model() -> TreeEnsembleRegressor {
        TreeEnsembleRegressor::new(100.0, 3, vec![small_tree(), stump(1, (-10.0, 10.0))]).unwrap()
    }

    #[test]
    fn test_predict_row() {
        let model = model();
        assert_eq!(model.predict_row(&[1.0, 1.0, 3.0]).unwrap(), 100.0 + 4.0 + 10.0);
        assert_eq!(model.predict_row(&[0.0, 0.0, 0.0]).unwrap(), 100.0 - 2.0 - 10.0);
        assert!(matches!(
            model.predict_row(&[0.0, 0.0]),
            Err(PricerError::DimensionMismatch(_, 3, 2))
        ));
    }

    #[test]
    fn test_predict_parallel_matches_serial() {
        let model = model();
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![(i % 2) as f64, (i % 3) as f64 / 2.0, i as f64 / 25.0]).collect();
        assert_eq!(model.predict(&rows, true).unwrap(), model.predict(&rows, false).unwrap());
    }

    #[test]
    fn test_contributions_sum_to_prediction() {
        let model = model();
        let rows = vec![vec![1.0, 1.0, 3.0], vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.2]];
        for method in [
            ContributionsMethod::Average,
            ContributionsMethod::Shapley,
            ContributionsMethod::Weight,
        ] {
            let contribs = model.predict_contributions(&rows, method, true).unwrap();
            for (row, c) in rows.iter().zip(contribs.iter()) {
                assert_eq!(c.len(), 4);
                assert_relative_eq!(c.iter().sum::<f64>(), model.predict_row(row).unwrap(), epsilon = 1e-9);
                let single = model.predict_contributions_row(row, method).unwrap();
                assert_eq!(&single, c);
            }
        }
    }

    #[test]
    fn test_invalid_model_rejected() {
        assert!(TreeEnsembleRegressor::new(0.0, 2, vec![small_tree()]).is_err());
        assert!(TreeEnsembleRegressor::new(f64::NAN, 3, vec![small_tree()]).is_err());
    }

    #[test]
    fn test_json_round_trip_and_missing() {
        let mut model = model();
        model.insert_metadata("market".to_string(), "balearic".to_string());
        let json = model.json_dump().unwrap();
        let loaded = TreeEnsembleRegressor::from_json(&json).unwrap();
        assert!(loaded.missing.is_nan());
        assert_eq!(loaded.get_metadata("market"), Some("balearic"));
        assert_eq!(loaded.predict_row(&[1.0, 1.0, 3.0]).unwrap(), 114.0);

        let json = r#"{"base_score": 1.0, "n_features": 1, "missing": -1.0, "trees": []}"#;
        let loaded = TreeEnsembleRegressor::from_json(json).unwrap();
        assert_eq!(loaded.missing, -1.0);
        assert_eq!(loaded.predict_row(&[5.0]).unwrap(), 1.0);
        assert!(TreeEnsembleRegressor::from_json("{").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let model = model();
        let path = std::env::temp_dir().join("house_pricer_test_model.json");
        model.save_model(&path).unwrap();
        let loaded = TreeEnsembleRegressor::load_model(&path).unwrap();
        assert_eq!(loaded.trees, model.trees);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_contributions_method_parse() {
        assert_eq!("shapley".parse::<ContributionsMethod>().unwrap(), ContributionsMethod::Shapley);
        assert_eq!("Average".parse::<ContributionsMethod>().unwrap(), ContributionsMethod::Average);
        assert!("Gain".parse::<ContributionsMethod>().is_err());
    }
}
