mod node;
mod shapley;

// Modules
pub mod builder;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod explain;
pub mod model_service;
pub mod regressor;
pub mod render;
pub mod sampler;
pub mod scaler;
pub mod schema;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use builder::{FeatureVector, FeatureVectorBuilder, RawInput};
pub use config::PricerConfig;
pub use context::{PriceEstimate, PricingContext};
pub use errors::PricerError;
pub use explain::{Attribution, Explanation, GlobalImportance};
pub use model_service::{ArtifactModelService, ModelService};
pub use regressor::{ContributionsMethod, TreeEnsembleRegressor};
pub use scaler::StandardScaler;
pub use schema::{FeatureSchema, IndicatorFamily};
