//! Feature Vector Builder
//!
//! Turns the handful of fields a person fills in into the dense, ordered,
//! one-hot encoded row the scaler and the regressor were fit on.
use crate::constants::{BATH_NUM, M2_REAL, ROOM_NUM};
use crate::errors::PricerError;
use crate::schema::{FeatureSchema, IndicatorFamily};
use serde::{Deserialize, Deserializer, Serialize};

/// Amenity flags, named after their schema columns.
pub const AMENITIES: [&str; 9] = [
    "air_conditioner",
    "balcony",
    "chimney",
    "garage",
    "garden",
    "reduced_mobility",
    "storage_room",
    "swimming_pool",
    "terrace",
];

const NUMERICS: [&str; 3] = [M2_REAL, ROOM_NUM, BATH_NUM];

/// Values collected for a single submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    /// Surface area in square meters.
    pub m2_real: f64,
    pub room_num: f64,
    pub bath_num: f64,
    #[serde(default, deserialize_with = "parse_flag")]
    pub air_conditioner: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub balcony: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub chimney: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub garage: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub garden: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub reduced_mobility: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub storage_room: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub swimming_pool: bool,
    #[serde(default, deserialize_with = "parse_flag")]
    pub terrace: bool,
    pub house_type: String,
    pub city: String,
    pub zone: String,
}

// Accepts `true`/`false`, `1`/`0` and the form's `Yes`/`No`.
fn parse_flag<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u8),
        Text(String),
    }
    match Flag::deserialize(d)? {
        Flag::Bool(b) => Ok(b),
        Flag::Number(0) => Ok(false),
        Flag::Number(1) => Ok(true),
        Flag::Number(n) => Err(serde::de::Error::custom(format!("invalid flag {}, expected 0 or 1", n))),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Ok(true),
            "no" | "n" | "false" | "0" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("invalid flag {:?}, expected Yes or No", s))),
        },
    }
}

impl RawInput {
    /// A submission with every amenity unset.
    pub fn new(zone: &str, city: &str, house_type: &str, m2_real: f64, room_num: f64, bath_num: f64) -> Self {
        RawInput {
            m2_real,
            room_num,
            bath_num,
            air_conditioner: false,
            balcony: false,
            chimney: false,
            garage: false,
            garden: false,
            reduced_mobility: false,
            storage_room: false,
            swimming_pool: false,
            terrace: false,
            house_type: house_type.to_string(),
            city: city.to_string(),
            zone: zone.to_string(),
        }
    }

    /// Numeric fields, in the order of `NUMERICS`.
    fn numerics(&self) -> [f64; 3] {
        [self.m2_real, self.room_num, self.bath_num]
    }

    /// Amenity flags, in the order of [`AMENITIES`].
    pub fn amenities(&self) -> [bool; 9] {
        [
            self.air_conditioner,
            self.balcony,
            self.chimney,
            self.garage,
            self.garden,
            self.reduced_mobility,
            self.storage_room,
            self.swimming_pool,
            self.terrace,
        ]
    }

    /// Set an amenity by its column name. Returns false for an unknown name.
    pub fn set_amenity(&mut self, name: &str, value: bool) -> bool {
        let flag = match name {
            "air_conditioner" => &mut self.air_conditioner,
            "balcony" => &mut self.balcony,
            "chimney" => &mut self.chimney,
            "garage" => &mut self.garage,
            "garden" => &mut self.garden,
            "reduced_mobility" => &mut self.reduced_mobility,
            "storage_room" => &mut self.storage_room,
            "swimming_pool" => &mut self.swimming_pool,
            "terrace" => &mut self.terrace,
            _ => return false,
        };
        *flag = value;
        true
    }

    fn selection(&self, family: IndicatorFamily) -> &str {
        match family {
            IndicatorFamily::HouseType => self.house_type.as_str(),
            IndicatorFamily::City => self.city.as_str(),
            IndicatorFamily::Zone => self.zone.as_str(),
        }
    }
}

/// A dense row covering exactly the schema columns, in schema order.
#[derive(Debug, Clone)]
pub struct FeatureVector<'a> {
    schema: &'a FeatureSchema,
    values: Vec<f64>,
}

impl<'a> FeatureVector<'a> {
    /// Value of a column by name.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.schema.position(key).map(|i| self.values[i])
    }

    /// (column, value) pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.schema
            .keys()
            .iter()
            .map(|k| k.as_str())
            .zip(self.values.iter().copied())
    }

    pub fn as_row(&self) -> &[f64] {
        &self.values
    }

    pub fn into_row(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn schema(&self) -> &'a FeatureSchema {
        self.schema
    }
}

impl PartialEq for FeatureVector<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.schema.keys() == other.schema.keys() && self.values == other.values
    }
}

/// Assembles [`FeatureVector`]s against one schema.
///
/// Raw column positions are resolved once, at construction. Indicator columns are
/// resolved through the schema's family lookup table on every build.
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder<'a> {
    schema: &'a FeatureSchema,
    numeric_positions: [usize; 3],
    amenity_positions: [usize; 9],
}

impl<'a> FeatureVectorBuilder<'a> {
    /// Fails with `InvalidSchema` if the schema lacks one of the raw columns.
    pub fn new(schema: &'a FeatureSchema) -> Result<Self, PricerError> {
        let resolve = |name: &str| {
            schema
                .position(name)
                .ok_or_else(|| PricerError::InvalidSchema(format!("missing raw column {:?}", name)))
        };
        let mut numeric_positions = [0; 3];
        for (slot, name) in numeric_positions.iter_mut().zip(NUMERICS) {
            *slot = resolve(name)?;
        }
        let mut amenity_positions = [0; 9];
        for (slot, name) in amenity_positions.iter_mut().zip(AMENITIES) {
            *slot = resolve(name)?;
        }
        Ok(FeatureVectorBuilder {
            schema,
            numeric_positions,
            amenity_positions,
        })
    }

    pub fn schema(&self) -> &'a FeatureSchema {
        self.schema
    }

    /// Build the model row for `raw`.
    ///
    /// Negative or non-finite numbers, and room or bath counts with a fractional part,
    /// fail with `InvalidValue`. A house type, city or
    /// zone without a schema column fails with `UnknownCategory`. Whether the city
    /// lies in the zone is not checked here, see [`FeatureSchema::check_city_in_zone`].
    pub fn build(&self, raw: &RawInput) -> Result<FeatureVector<'a>, PricerError> {
        let mut values = vec![0.0; self.schema.len()];

        for ((name, value), position) in NUMERICS.iter().zip(raw.numerics()).zip(self.numeric_positions) {
            let fractional_count = *name != M2_REAL && value.fract() != 0.0;
            if !value.is_finite() || value < 0.0 || fractional_count {
                return Err(PricerError::InvalidValue {
                    field: name.to_string(),
                    value,
                });
            }
            values[position] = value;
        }

        for (flag, position) in raw.amenities().into_iter().zip(self.amenity_positions) {
            values[position] = if flag { 1.0 } else { 0.0 };
        }

        for family in IndicatorFamily::ALL {
            let position = self.schema.indicator_position(family, raw.selection(family))?;
            values[position] = 1.0;
        }

        Ok(FeatureVector {
            schema: self.schema,
            values,
        })
    }
}
