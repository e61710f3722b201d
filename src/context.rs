//! Pricing Context
//!
//! The schema and the loaded model service, bundled once at startup and shared
//! read-only by every estimate.
use crate::builder::{FeatureVectorBuilder, RawInput};
use crate::config::PricerConfig;
use crate::errors::PricerError;
use crate::explain::{Explanation, GlobalImportance};
use crate::model_service::{ArtifactModelService, ModelService};
use crate::sampler::{InputSampler, UniformInputSampler};
use crate::schema::FeatureSchema;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

/// A priced submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub price: f64,
    pub explanation: Explanation,
}

/// Read-only pairing of a feature schema with a model service fit on the same columns.
pub struct PricingContext<S: ModelService = ArtifactModelService> {
    schema: FeatureSchema,
    service: S,
    parallel: bool,
}

impl PricingContext<ArtifactModelService> {
    /// Load the Balearic schema and the artifacts named by `config`.
    pub fn load(config: &PricerConfig) -> Result<Self, PricerError> {
        let schema = FeatureSchema::balearic()?;
        let service = ArtifactModelService::load(&config.artifact_dir)?
            .set_contributions_method(config.contributions_method)
            .set_parallel(config.parallel);
        let context = PricingContext::new(schema, service)?;
        Ok(context.set_parallel(config.parallel))
    }
}

impl<S: ModelService> PricingContext<S> {
    /// Fails with `ColumnOrderMismatch` or `DimensionMismatch` when the service
    /// columns are not exactly the schema keys.
    pub fn new(schema: FeatureSchema, service: S) -> Result<Self, PricerError> {
        schema.check_columns(service.columns())?;
        FeatureVectorBuilder::new(&schema)?;
        info!("Pricing context ready over {} columns.", schema.len());
        Ok(PricingContext {
            schema,
            service,
            parallel: true,
        })
    }

    /// Run batch estimates on the rayon pool.
    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn builder(&self) -> Result<FeatureVectorBuilder<'_>, PricerError> {
        FeatureVectorBuilder::new(&self.schema)
    }

    fn scaled_row(&self, builder: &FeatureVectorBuilder, raw: &RawInput) -> Result<Vec<f64>, PricerError> {
        let vector = builder.build(raw)?;
        self.service.scale(vector.as_row())
    }

    /// Price one submission and explain the price.
    pub fn estimate(&self, raw: &RawInput) -> Result<PriceEstimate, PricerError> {
        let builder = self.builder()?;
        self.estimate_with(&builder, raw)
    }

    fn estimate_with(&self, builder: &FeatureVectorBuilder, raw: &RawInput) -> Result<PriceEstimate, PricerError> {
        let scaled = self.scaled_row(builder, raw)?;
        let price = self.service.predict(&scaled)?;
        let explanation = self.service.explain(&scaled)?;
        debug!(
            "Estimated {:.2} for {} in {}, {} m2.",
            price, raw.house_type, raw.city, raw.m2_real
        );
        Ok(PriceEstimate { price, explanation })
    }

    /// Price many submissions. A failing row does not stop the others.
    pub fn estimate_batch(&self, inputs: &[RawInput]) -> Result<Vec<Result<PriceEstimate, PricerError>>, PricerError> {
        let builder = self.builder()?;
        let estimates = if self.parallel {
            inputs.par_iter().map(|raw| self.estimate_with(&builder, raw)).collect()
        } else {
            inputs.iter().map(|raw| self.estimate_with(&builder, raw)).collect()
        };
        Ok(estimates)
    }

    /// Price records that may already have failed upstream, such as rows of a csv
    /// file that did not parse. Failed records keep their error and their slot.
    pub fn estimate_records(
        &self,
        records: Vec<Result<RawInput, PricerError>>,
    ) -> Result<Vec<Result<PriceEstimate, PricerError>>, PricerError> {
        let builder = self.builder()?;
        let run = |record: Result<RawInput, PricerError>| record.and_then(|raw| self.estimate_with(&builder, &raw));
        let estimates = if self.parallel {
            records.into_par_iter().map(run).collect()
        } else {
            records.into_iter().map(run).collect()
        };
        Ok(estimates)
    }

    /// Global importance over `n` synthetic submissions drawn with `seed`.
    pub fn reference_importance(&self, n: usize, seed: u64) -> Result<GlobalImportance, PricerError> {
        let builder = self.builder()?;
        let inputs = UniformInputSampler::new(seed).sample(&self.schema, n)?;
        let sample = inputs
            .iter()
            .map(|raw| self.scaled_row(&builder, raw))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Explaining a reference sample of {} submissions.", sample.len());
        self.service.explain_global(&sample)
    }
}
