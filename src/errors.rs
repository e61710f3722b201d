//! Errors
//!
//! Custom error types used throughout the `house_pricer` crate.
use crate::constants::PREDICTION_UNAVAILABLE;
use crate::schema::IndicatorFamily;
use thiserror::Error;

/// Errors that can occur while assembling a feature vector or running the model service.
#[derive(Debug, Error)]
pub enum PricerError {
    /// Zone is not one of the zones known to the schema.
    #[error("Unknown zone {0:?}, expected one of {1}.")]
    UnknownZone(String, String),
    /// A categorical selection has no indicator column in the schema.
    #[error("Unknown {family} {value:?}, no matching column in the feature schema.")]
    UnknownCategory { family: IndicatorFamily, value: String },
    /// A numeric field is negative, not finite, or a fractional count.
    #[error("Invalid value {value} passed for {field}, expected a finite non-negative number (whole for counts).")]
    InvalidValue { field: String, value: f64 },
    /// The selected city is not part of the selected zone.
    #[error("City {city:?} does not belong to zone {zone:?}.")]
    CityNotInZone { zone: String, city: String },
    /// The static schema definition breaks one of its invariants.
    #[error("Invalid feature schema: {0}")]
    InvalidSchema(String),
    /// Artifact columns differ from the schema columns.
    #[error("Artifact column {position} is {found:?}, but the feature schema expects {expected:?}.")]
    ColumnOrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },
    /// Row width does not match the width the artifacts were fit on.
    #[error("{0} expects {1} columns, but {2} were provided.")]
    DimensionMismatch(String, usize, usize),
    /// Scaling, prediction or explanation failed.
    #[error("Model service error: {0}")]
    ModelService(String),
    /// Unable to read an artifact or input file.
    #[error("Unable to read {0}: {1}")]
    UnableToRead(String, String),
    /// Unable to write a file.
    #[error("Unable to write file: {0}")]
    UnableToWrite(String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
}

impl PricerError {
    /// Errors caused by what the user selected or typed, as opposed to
    /// problems with the loaded artifacts.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PricerError::UnknownZone(..)
                | PricerError::UnknownCategory { .. }
                | PricerError::InvalidValue { .. }
                | PricerError::CityNotInZone { .. }
        )
    }

    /// Scaling, prediction or explanation failed for a well formed submission.
    pub fn is_model_error(&self) -> bool {
        matches!(self, PricerError::ModelService(..) | PricerError::DimensionMismatch(..))
    }

    /// Message to show the person who submitted the form. Model failures are
    /// reported generically, their details belong in the logs.
    pub fn user_message(&self) -> String {
        if self.is_model_error() {
            PREDICTION_UNAVAILABLE.to_string()
        } else {
            self.to_string()
        }
    }
}
