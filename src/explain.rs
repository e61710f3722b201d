//! Explanations
//!
//! Labelled attributions for a single prediction, and their aggregate over a
//! sample of predictions.
use crate::errors::PricerError;
use crate::schema::IndicatorFamily;
use serde::{Deserialize, Serialize};

/// Signed contribution of one feature to a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

/// How a single prediction departs from the baseline, feature by feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Expected model output over the training distribution.
    pub baseline: f64,
    /// One entry per model column, in column order.
    pub attributions: Vec<Attribution>,
}

impl Explanation {
    /// Label a contributions vector (one slot per column, then the bias) with column names.
    pub fn from_contributions(columns: &[String], contribs: &[f64]) -> Result<Self, PricerError> {
        if contribs.len() != columns.len() + 1 {
            return Err(PricerError::DimensionMismatch(
                "Explanation".to_string(),
                columns.len() + 1,
                contribs.len(),
            ));
        }
        let attributions = columns
            .iter()
            .zip(contribs.iter())
            .map(|(feature, value)| Attribution {
                feature: feature.clone(),
                value: *value,
            })
            .collect();
        Ok(Explanation {
            baseline: contribs[columns.len()],
            attributions,
        })
    }

    /// Baseline plus every attribution.
    pub fn total(&self) -> f64 {
        self.baseline + self.attributions.iter().map(|a| a.value).sum::<f64>()
    }

    /// The `n` largest attributions by magnitude. Ties keep column order.
    pub fn top(&self, n: usize) -> Vec<&Attribution> {
        top_by_magnitude(&self.attributions, n)
    }

    /// Collapse each one-hot family into a single `house_type`, `city` or `zone` entry.
    ///
    /// The total is unchanged. Raw columns keep their place, each family takes the
    /// place of its first column.
    pub fn grouped(&self) -> Explanation {
        Explanation {
            baseline: self.baseline,
            attributions: group_families(&self.attributions),
        }
    }
}

/// Mean absolute attribution of every feature over a sample of predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImportance {
    pub n_samples: usize,
    /// Sorted from most to least important.
    pub importances: Vec<Attribution>,
}

impl GlobalImportance {
    /// Aggregate explanations that share the same columns.
    pub fn from_explanations(explanations: &[Explanation]) -> Result<Self, PricerError> {
        let first = match explanations.first() {
            Some(e) => e,
            None => {
                return Err(PricerError::ModelService(
                    "global importance needs at least one explanation".to_string(),
                ))
            }
        };
        let width = first.attributions.len();
        let mut totals = vec![0.0; width];
        for explanation in explanations {
            if explanation.attributions.len() != width {
                return Err(PricerError::DimensionMismatch(
                    "Global importance".to_string(),
                    width,
                    explanation.attributions.len(),
                ));
            }
            for (total, a) in totals.iter_mut().zip(explanation.attributions.iter()) {
                *total += a.value.abs();
            }
        }
        let n = explanations.len() as f64;
        let mut importances: Vec<Attribution> = first
            .attributions
            .iter()
            .zip(totals)
            .map(|(a, total)| Attribution {
                feature: a.feature.clone(),
                value: total / n,
            })
            .collect();
        sort_by_magnitude(&mut importances);
        Ok(GlobalImportance {
            n_samples: explanations.len(),
            importances,
        })
    }

    pub fn top(&self, n: usize) -> Vec<&Attribution> {
        top_by_magnitude(&self.importances, n)
    }

    /// Sum the importance of each one-hot family into a single entry, re-sorted.
    pub fn grouped(&self) -> GlobalImportance {
        let mut importances = group_families(&self.importances);
        sort_by_magnitude(&mut importances);
        GlobalImportance {
            n_samples: self.n_samples,
            importances,
        }
    }

    /// Importance of one feature, by name.
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.importances.iter().find(|a| a.feature == feature).map(|a| a.value)
    }
}

// Stable, so equal magnitudes keep their relative order.
fn sort_by_magnitude(attributions: &mut [Attribution]) {
    attributions.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
}

fn top_by_magnitude(attributions: &[Attribution], n: usize) -> Vec<&Attribution> {
    let mut sorted: Vec<&Attribution> = attributions.iter().collect();
    sorted.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    sorted.truncate(n);
    sorted
}

fn group_families(attributions: &[Attribution]) -> Vec<Attribution> {
    let mut grouped: Vec<Attribution> = Vec::with_capacity(attributions.len());
    let mut family_slots: [Option<usize>; 3] = [None; 3];
    for a in attributions {
        match IndicatorFamily::of_key(&a.feature) {
            None => grouped.push(a.clone()),
            Some(family) => {
                let slot = &mut family_slots[family as usize];
                match *slot {
                    Some(i) => grouped[i].value += a.value,
                    None => {
                        *slot = Some(grouped.len());
                        grouped.push(Attribution {
                            feature: family.label().to_string(),
                            value: a.value,
                        });
                    }
                }
            }
        }
    }
    grouped
}
