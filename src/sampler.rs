//! Sampler
//!
//! Draws plausible form submissions, used as the reference sample when
//! estimating global feature importance.
use crate::builder::{RawInput, AMENITIES};
use crate::constants::{AMENITY_PROBABILITY, SAMPLE_BATH_RANGE, SAMPLE_M2_RANGE, SAMPLE_ROOM_RANGE};
use crate::errors::PricerError;
use crate::schema::FeatureSchema;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

// A sampler produces raw inputs that the builder accepts for a given schema.
pub trait InputSampler {
    /// Draw `n` inputs.
    fn sample(&mut self, schema: &FeatureSchema, n: usize) -> Result<Vec<RawInput>, PricerError>;
}

/// Uniform over zones, then over the cities of the chosen zone and over house types.
/// Amenities are switched on independently.
pub struct UniformInputSampler {
    rng: StdRng,
}

impl UniformInputSampler {
    pub fn new(seed: u64) -> Self {
        UniformInputSampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self, zones: &[&str], schema: &FeatureSchema, house_types: &[&str]) -> Result<RawInput, PricerError> {
        let zone = *zones
            .choose(&mut self.rng)
            .ok_or_else(|| PricerError::InvalidSchema("no zones to sample from".to_string()))?;
        let cities = schema.cities_for_zone(zone)?;
        let city = *cities
            .choose(&mut self.rng)
            .ok_or_else(|| PricerError::InvalidSchema(format!("zone {:?} has no cities to sample from", zone)))?;
        let house_type = *house_types
            .choose(&mut self.rng)
            .ok_or_else(|| PricerError::InvalidSchema("no house types to sample from".to_string()))?;

        let m2_real = self.rng.gen_range(SAMPLE_M2_RANGE.0..SAMPLE_M2_RANGE.1).round();
        let room_num = self.rng.gen_range(SAMPLE_ROOM_RANGE.0..=SAMPLE_ROOM_RANGE.1);
        let bath_num = self.rng.gen_range(SAMPLE_BATH_RANGE.0..=SAMPLE_BATH_RANGE.1.min(room_num + 1));
        let mut input = RawInput::new(zone, city, house_type, m2_real, room_num as f64, bath_num as f64);
        for amenity in AMENITIES {
            let on = self.rng.gen_bool(AMENITY_PROBABILITY);
            input.set_amenity(amenity, on);
        }
        Ok(input)
    }
}

impl InputSampler for UniformInputSampler {
    fn sample(&mut self, schema: &FeatureSchema, n: usize) -> Result<Vec<RawInput>, PricerError> {
        let zones = schema.list_zones();
        let house_types = schema.list_house_types();
        (0..n).map(|_| self.sample_one(&zones, schema, &house_types)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FeatureVectorBuilder;

    #[test]
    fn test_samples_are_buildable_and_consistent() {
        let schema = FeatureSchema::balearic().unwrap();
        let builder = FeatureVectorBuilder::new(&schema).unwrap();
        let mut sampler = UniformInputSampler::new(7);
        let inputs = sampler.sample(&schema, 300).unwrap();
        assert_eq!(inputs.len(), 300);
        for input in &inputs {
            assert!(schema.check_city_in_zone(&input.zone, &input.city).is_ok());
            assert!(input.m2_real >= SAMPLE_M2_RANGE.0 && input.m2_real <= SAMPLE_M2_RANGE.1);
            assert!(input.bath_num >= 1.0 && input.bath_num <= input.room_num + 1.0);
            assert!(builder.build(input).is_ok());
        }
        let zones: std::collections::HashSet<&str> = inputs.iter().map(|i| i.zone.as_str()).collect();
        assert_eq!(zones.len(), 3);
        assert!(inputs.iter().any(|i| i.garden) && inputs.iter().any(|i| !i.garden));
    }

    #[test]
    fn test_seeded_sampler_is_reproducible() {
        let schema = FeatureSchema::balearic().unwrap();
        let a = UniformInputSampler::new(42).sample(&schema, 25).unwrap();
        let b = UniformInputSampler::new(42).sample(&schema, 25).unwrap();
        let c = UniformInputSampler::new(43).sample(&schema, 25).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_sample() {
        let schema = FeatureSchema::balearic().unwrap();
        assert!(UniformInputSampler::new(0).sample(&schema, 0).unwrap().is_empty());
    }
}
