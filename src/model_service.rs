//! Model Service
//!
//! The narrow interface the pricing pipeline calls: scale a row, predict a
//! price, explain that price, and aggregate explanations over a sample.
use crate::constants::{COLUMNS_FILE, MODEL_FILE, SCALER_FILE};
use crate::errors::PricerError;
use crate::explain::{Explanation, GlobalImportance};
use crate::regressor::{ContributionsMethod, TreeEnsembleRegressor};
use crate::scaler::StandardScaler;
use crate::utils::read_json;
use log::info;
use rayon::prelude::*;
use std::path::Path;

/// Load-once, call-many model operations. Implementations hold no per-call state.
pub trait ModelService: Send + Sync {
    /// Column names the artifacts were fit on, in order.
    fn columns(&self) -> &[String];

    /// Standardize a row laid out as [`ModelService::columns`].
    fn scale(&self, row: &[f64]) -> Result<Vec<f64>, PricerError>;

    /// Predict the price of a scaled row.
    fn predict(&self, scaled: &[f64]) -> Result<f64, PricerError>;

    /// Attribute the prediction of a scaled row to each column.
    fn explain(&self, scaled: &[f64]) -> Result<Explanation, PricerError>;

    /// Mean absolute attribution over a sample of scaled rows.
    fn explain_global(&self, sample: &[Vec<f64>]) -> Result<GlobalImportance, PricerError> {
        let explanations = sample
            .iter()
            .map(|row| self.explain(row))
            .collect::<Result<Vec<_>, _>>()?;
        GlobalImportance::from_explanations(&explanations)
    }
}

/// Model service backed by the serialized scaler and tree ensemble.
#[derive(Debug, Clone)]
pub struct ArtifactModelService {
    columns: Vec<String>,
    scaler: StandardScaler,
    regressor: TreeEnsembleRegressor,
    contributions_method: ContributionsMethod,
    parallel: bool,
}

impl ArtifactModelService {
    /// Bundle loaded artifacts, checking they agree on width and column names.
    pub fn new(
        columns: Vec<String>,
        scaler: StandardScaler,
        regressor: TreeEnsembleRegressor,
    ) -> Result<Self, PricerError> {
        if scaler.n_features() != columns.len() {
            return Err(PricerError::DimensionMismatch(
                "Scaler".to_string(),
                columns.len(),
                scaler.n_features(),
            ));
        }
        if regressor.n_features != columns.len() {
            return Err(PricerError::DimensionMismatch(
                "Regressor".to_string(),
                columns.len(),
                regressor.n_features,
            ));
        }
        if let Some(names) = &scaler.feature_names {
            if let Some(position) = columns.iter().zip(names.iter()).position(|(c, n)| c != n) {
                return Err(PricerError::ColumnOrderMismatch {
                    position,
                    expected: columns[position].clone(),
                    found: names[position].clone(),
                });
            }
        }
        Ok(ArtifactModelService {
            columns,
            scaler,
            regressor,
            contributions_method: ContributionsMethod::default(),
            parallel: true,
        })
    }

    /// Load `columns.json`, `scaler.json` and `model.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, PricerError> {
        let columns: Vec<String> = read_json(&dir.join(COLUMNS_FILE))?;
        let scaler = StandardScaler::load_scaler(&dir.join(SCALER_FILE))?;
        let regressor = TreeEnsembleRegressor::load_model(&dir.join(MODEL_FILE))?;
        info!("Loaded {} artifact columns from {}.", columns.len(), dir.display());
        ArtifactModelService::new(columns, scaler, regressor)
    }

    /// Set the attribution method used by [`ModelService::explain`].
    pub fn set_contributions_method(mut self, contributions_method: ContributionsMethod) -> Self {
        self.contributions_method = contributions_method;
        self
    }

    /// Explain samples in parallel.
    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn contributions_method(&self) -> ContributionsMethod {
        self.contributions_method
    }

    pub fn regressor(&self) -> &TreeEnsembleRegressor {
        &self.regressor
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

impl ModelService for ArtifactModelService {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn scale(&self, row: &[f64]) -> Result<Vec<f64>, PricerError> {
        self.scaler.transform(row)
    }

    fn predict(&self, scaled: &[f64]) -> Result<f64, PricerError> {
        self.regressor.predict_row(scaled)
    }

    fn explain(&self, scaled: &[f64]) -> Result<Explanation, PricerError> {
        let contribs = self
            .regressor
            .predict_contributions_row(scaled, self.contributions_method)?;
        Explanation::from_contributions(&self.columns, &contribs)
    }

    fn explain_global(&self, sample: &[Vec<f64>]) -> Result<GlobalImportance, PricerError> {
        let contribs = self
            .regressor
            .predict_contributions(sample, self.contributions_method, self.parallel)?;
        let explanations = if self.parallel {
            contribs
                .par_iter()
                .map(|c| Explanation::from_contributions(&self.columns, c))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            contribs
                .iter()
                .map(|c| Explanation::from_contributions(&self.columns, c))
                .collect::<Result<Vec<_>, _>>()?
        };
        GlobalImportance::from_explanations(&explanations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::tree::Tree;
    use approx::assert_relative_eq;

    fn columns() -> Vec<String> {
        vec!["m2_real".to_string(), "garden".to_string()]
    }

    fn service() -> ArtifactModelService {
        let scaler = StandardScaler::new(vec![100.0, 0.5], vec![50.0, 0.5]).unwrap();
        let tree = Tree::from_nodes(vec![
            Node::split(0, 0.0, 10.0, 0, 0.0, 1, 2, None),
            Node::leaf(1, -50_000.0, 5.0),
            Node::split(2, 0.0, 5.0, 1, 0.0, 3, 4, None),
            Node::leaf(3, 40_000.0, 3.0),
            Node::leaf(4, 90_000.0, 2.0),
        ]);
        let regressor = TreeEnsembleRegressor::new(250_000.0, 2, vec![tree]).unwrap();
        ArtifactModelService::new(columns(), scaler, regressor).unwrap()
    }

    #[test]
    fn test_scale_predict_explain() {
        let service = service();
        let scaled = service.scale(&[150.0, 1.0]).unwrap();
        assert_eq!(scaled, vec![1.0, 1.0]);
        let price = service.predict(&scaled).unwrap();
        assert_eq!(price, 340_000.0);
        let explanation = service.explain(&scaled).unwrap();
        assert_eq!(explanation.attributions.len(), 2);
        assert_eq!(explanation.attributions[1].feature, "garden");
        assert_relative_eq!(explanation.total(), price, epsilon = 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_surfaces() {
        let service = service();
        assert!(matches!(
            service.scale(&[150.0]),
            Err(PricerError::DimensionMismatch(..))
        ));
        assert!(matches!(
            service.predict(&[1.0, 1.0, 1.0]),
            Err(PricerError::DimensionMismatch(..))
        ));
    }

    #[test]
    fn test_explain_global_parallel_matches_trait_default() {
        let service = service();
        let sample: Vec<Vec<f64>> = (0..20)
            .map(|i| service.scale(&[50.0 + 10.0 * i as f64, (i % 2) as f64]).unwrap())
            .collect();
        let parallel = service.explain_global(&sample).unwrap();
        let serial = service.clone().set_parallel(false).explain_global(&sample).unwrap();
        assert_eq!(parallel, serial);
        assert_eq!(parallel.n_samples, 20);
        assert_eq!(parallel.importances[0].feature, "m2_real");
        assert!(service.explain_global(&[]).is_err());
    }

    #[test]
    fn test_methods_agree_on_total() {
        for method in [ContributionsMethod::Average, ContributionsMethod::Weight] {
            let service = service().set_contributions_method(method);
            assert_eq!(service.contributions_method(), method);
            let scaled = service.scale(&[40.0, 0.0]).unwrap();
            let explanation = service.explain(&scaled).unwrap();
            assert_relative_eq!(explanation.total(), service.predict(&scaled).unwrap(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_artifact_width_checks() {
        let scaler = StandardScaler::identity(3);
        let regressor = TreeEnsembleRegressor::new(0.0, 2, vec![]).unwrap();
        assert!(matches!(
            ArtifactModelService::new(columns(), scaler, regressor.clone()),
            Err(PricerError::DimensionMismatch(..))
        ));

        let mut named = StandardScaler::identity(2);
        named.feature_names = Some(vec!["garden".to_string(), "m2_real".to_string()]);
        assert!(matches!(
            ArtifactModelService::new(columns(), named, regressor),
            Err(PricerError::ColumnOrderMismatch { position: 0, .. })
        ));
    }
}
