//! Feature Schema
//!
//! The ordered list of columns the scaler and the regressor were fit on, its
//! partition into raw attributes and one-hot indicator families, and the
//! zone to cities containment relation used to narrow location choices.
use crate::constants::{CITY_PREFIX, HOUSE_TYPE_PREFIX, ZONE_PREFIX};
use crate::errors::PricerError;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Raw attributes, in training column order.
pub const RAW_KEYS: [&str; 12] = [
    "air_conditioner",
    "balcony",
    "bath_num",
    "chimney",
    "garage",
    "garden",
    "m2_real",
    "reduced_mobility",
    "room_num",
    "storage_room",
    "swimming_pool",
    "terrace",
];

// Values are the training labels verbatim, leading whitespace included:
// " Casa rural" and "Casa rural" are two distinct columns.
const HOUSE_TYPES: [&str; 19] = [
    " Casa o chalet",
    " Casa o chalet independiente",
    " Casa rural",
    " Casa terrera",
    " Caserón",
    " Castillo",
    " Chalet adosado",
    " Chalet pareado",
    " Cortijo",
    " Finca rústica",
    " Masía",
    " Palacio",
    " Torre",
    "Casa rural",
    "Dúplex",
    "Estudio",
    "Piso",
    "Piso con ascensor",
    "Ático",
];

const CITIES: [&str; 73] = [
    "Alaró",
    "Ariany",
    "Bañalbufar",
    "Binissalem",
    "Buger",
    "Bunyola",
    "Cala Bona",
    "Cala Millor",
    "Cala Ratjada",
    "Calvià",
    "Campanet",
    "Campos",
    "Canyamel",
    "Capdepera",
    "Colonia de Sant Jordi",
    "Consell",
    "Costa de los Pinos",
    "Costitx",
    "Deya",
    "Eivissa",
    "Es Mercadal",
    "Es Migjorn Gran",
    "Escorca",
    "Esporles",
    "Estellenchs",
    "Felanitx",
    "Ferreries",
    "Formentera",
    "Fornalutx",
    "Inca",
    "Lloret de Vista Alegre",
    "Lloseta",
    "Llubi",
    "Llucmajor",
    "Manacor",
    "Mancor de la Vall",
    "Maria de la Salud",
    "Marratxi",
    "Maó/Mahon",
    "Montuiri",
    "Muro",
    "Palma de Mallorca",
    "Palmanyola",
    "Petra",
    "Pobla (Sa)",
    "Pollença",
    "Porreres",
    "Portinax",
    "Puerto de Pollença",
    "Puigpunyent",
    "Sa Coma",
    "Sa Ràpita",
    "San Rafael",
    "San Vicente",
    "Sant Antoni de Portmany",
    "Sant Joan",
    "Sant Joan de Labritja",
    "Sant Josep de Sa Talaia",
    "Sant Llorenç Des Cardassar",
    "Sant Lluis",
    "Santa Eugenia",
    "Santa Eulalia del Río",
    "Santa Margalida",
    "Santa Maria del Cami",
    "Selva",
    "Sencelles",
    "Ses Salines (Mallorca)",
    "Sineu",
    "Soller",
    "Son Carrio",
    "Son Servera",
    "Valldemossa",
    "Villafranca de Bonany",
];

const IBIZA: &str = "Ibiza, Balears (Illes)";
const MALLORCA: &str = "Mallorca, Balears (Illes)";
const MENORCA: &str = "Menorca, Balears (Illes)";

const ZONES: [&str; 3] = [IBIZA, MALLORCA, MENORCA];

const IBIZA_CITIES: [&str; 9] = [
    "Eivissa",
    "Formentera",
    "Portinax",
    "San Rafael",
    "San Vicente",
    "Sant Antoni de Portmany",
    "Sant Joan de Labritja",
    "Sant Josep de Sa Talaia",
    "Santa Eulalia del Río",
];

const MENORCA_CITIES: [&str; 5] = ["Es Mercadal", "Es Migjorn Gran", "Ferreries", "Maó/Mahon", "Sant Lluis"];

// Zone columns and the zone map must cover each other, and so must city columns
// and the cities of the map.
fn check_zone_coverage(
    zone_columns: &HashMap<String, usize>,
    city_columns: &HashMap<String, usize>,
    zone_to_cities: &BTreeMap<String, BTreeSet<String>>,
) -> Result<(), PricerError> {
    let mut reachable = HashSet::new();
    for (zone, cities) in zone_to_cities.iter() {
        if !zone_columns.contains_key(zone) {
            return Err(PricerError::InvalidSchema(format!("zone {:?} has no column", zone)));
        }
        for city in cities {
            if !city_columns.contains_key(city) {
                return Err(PricerError::InvalidSchema(format!(
                    "city {:?} of zone {:?} has no column",
                    city, zone
                )));
            }
            reachable.insert(city.as_str());
        }
    }
    if let Some(zone) = zone_columns.keys().find(|z| !zone_to_cities.contains_key(*z)) {
        return Err(PricerError::InvalidSchema(format!("zone {:?} has no cities", zone)));
    }
    if let Some(city) = city_columns.keys().find(|c| !reachable.contains(c.as_str())) {
        return Err(PricerError::InvalidSchema(format!("city {:?} belongs to no zone", city)));
    }
    Ok(())
}

/// One-hot indicator families. Exactly one column of each family is set per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorFamily {
    HouseType,
    City,
    Zone,
}

impl IndicatorFamily {
    pub const ALL: [IndicatorFamily; 3] = [IndicatorFamily::HouseType, IndicatorFamily::City, IndicatorFamily::Zone];

    /// Column prefix shared by every member of the family.
    pub fn prefix(&self) -> &'static str {
        match self {
            IndicatorFamily::HouseType => HOUSE_TYPE_PREFIX,
            IndicatorFamily::City => CITY_PREFIX,
            IndicatorFamily::Zone => ZONE_PREFIX,
        }
    }

    /// Short label used when the family is shown as a single feature.
    pub fn label(&self) -> &'static str {
        match self {
            IndicatorFamily::HouseType => "house_type",
            IndicatorFamily::City => "city",
            IndicatorFamily::Zone => "zone",
        }
    }

    /// Column name of `value` within the family.
    pub fn key(&self, value: &str) -> String {
        format!("{}{}", self.prefix(), value)
    }

    /// The family a column belongs to, `None` for raw columns.
    pub fn of_key(key: &str) -> Option<IndicatorFamily> {
        IndicatorFamily::ALL.into_iter().find(|f| key.starts_with(f.prefix()))
    }

    fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix())
    }
}

impl fmt::Display for IndicatorFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IndicatorFamily::HouseType => write!(f, "house type"),
            IndicatorFamily::City => write!(f, "city"),
            IndicatorFamily::Zone => write!(f, "zone"),
        }
    }
}

impl FromStr for IndicatorFamily {
    type Err = PricerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house_type" => Ok(IndicatorFamily::HouseType),
            "city" => Ok(IndicatorFamily::City),
            "zone" => Ok(IndicatorFamily::Zone),
            _ => Err(PricerError::ParseString(
                s.to_string(),
                "IndicatorFamily".to_string(),
                "house_type, city, zone".to_string(),
            )),
        }
    }
}

/// What a single schema column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Numeric or pre-binarized attribute.
    Raw,
    /// Member of a one-hot family.
    Indicator(IndicatorFamily),
}

impl FeatureKind {
    fn classify(key: &str) -> (FeatureKind, &str) {
        for family in IndicatorFamily::ALL {
            if let Some(value) = family.strip(key) {
                return (FeatureKind::Indicator(family), value);
            }
        }
        (FeatureKind::Raw, key)
    }
}

/// Immutable, ordered definition of every column the trained model expects.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    keys: Vec<String>,
    kinds: Vec<FeatureKind>,
    positions: HashMap<String, usize>,
    indicators: HashMap<IndicatorFamily, HashMap<String, usize>>,
    zone_to_cities: BTreeMap<String, BTreeSet<String>>,
}

impl FeatureSchema {
    /// Build a schema from its ordered keys and the zone to cities relation.
    ///
    /// * `keys` - Column names, in the order the artifacts were fit on.
    /// * `zone_to_cities` - Cities considered part of each zone.
    ///
    /// Fails with `InvalidSchema` if keys repeat, an indicator has an empty value,
    /// or the zone mapping and the zone/city columns do not cover each other.
    pub fn new(keys: Vec<String>, zone_to_cities: BTreeMap<String, BTreeSet<String>>) -> Result<Self, PricerError> {
        let mut positions = HashMap::with_capacity(keys.len());
        let mut kinds = Vec::with_capacity(keys.len());
        let mut indicators: HashMap<IndicatorFamily, HashMap<String, usize>> = HashMap::new();
        for (i, key) in keys.iter().enumerate() {
            if positions.insert(key.clone(), i).is_some() {
                return Err(PricerError::InvalidSchema(format!("duplicate key {:?}", key)));
            }
            let (kind, value) = FeatureKind::classify(key);
            if let FeatureKind::Indicator(family) = kind {
                if value.is_empty() {
                    return Err(PricerError::InvalidSchema(format!("empty {} indicator {:?}", family, key)));
                }
                indicators.entry(family).or_default().insert(value.to_string(), i);
            }
            kinds.push(kind);
        }

        for family in IndicatorFamily::ALL {
            if !indicators.contains_key(&family) {
                return Err(PricerError::InvalidSchema(format!("no {} columns", family)));
            }
        }

        check_zone_coverage(
            &indicators[&IndicatorFamily::Zone],
            &indicators[&IndicatorFamily::City],
            &zone_to_cities,
        )?;

        Ok(FeatureSchema {
            keys,
            kinds,
            positions,
            indicators,
            zone_to_cities,
        })
    }

    /// The schema of the Balearic islands market.
    pub fn balearic() -> Result<Self, PricerError> {
        let keys: Vec<String> = RAW_KEYS
            .iter()
            .map(|k| k.to_string())
            .chain(HOUSE_TYPES.iter().map(|t| IndicatorFamily::HouseType.key(t)))
            .chain(CITIES.iter().map(|c| IndicatorFamily::City.key(c)))
            .chain(ZONES.iter().map(|z| IndicatorFamily::Zone.key(z)))
            .collect();

        let mut zone_to_cities: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        zone_to_cities.insert(IBIZA.to_string(), IBIZA_CITIES.iter().map(|c| c.to_string()).collect());
        zone_to_cities.insert(MENORCA.to_string(), MENORCA_CITIES.iter().map(|c| c.to_string()).collect());
        // Mallorca takes every city not claimed by the smaller islands.
        zone_to_cities.insert(
            MALLORCA.to_string(),
            CITIES
                .iter()
                .filter(|c| !IBIZA_CITIES.contains(c) && !MENORCA_CITIES.contains(c))
                .map(|c| c.to_string())
                .collect(),
        );

        FeatureSchema::new(keys, zone_to_cities)
    }

    /// Column names in model order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn kind(&self, index: usize) -> Option<FeatureKind> {
        self.kinds.get(index).copied()
    }

    /// Membership test against the schema columns.
    pub fn is_valid_key(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Column index of `name`, if it is a schema column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Column index of the indicator for `value` within `family`.
    pub fn indicator_position(&self, family: IndicatorFamily, value: &str) -> Result<usize, PricerError> {
        self.indicators
            .get(&family)
            .and_then(|columns| columns.get(value))
            .copied()
            .ok_or_else(|| PricerError::UnknownCategory {
                family,
                value: value.to_string(),
            })
    }

    /// Every value of an indicator family, sorted.
    pub fn list_values(&self, family: IndicatorFamily) -> Vec<&str> {
        let mut values: Vec<&str> = self
            .indicators
            .get(&family)
            .map(|columns| columns.keys().map(|v| v.as_str()).collect())
            .unwrap_or_default();
        values.sort_unstable();
        values
    }

    pub fn list_house_types(&self) -> Vec<&str> {
        self.list_values(IndicatorFamily::HouseType)
    }

    pub fn list_cities(&self) -> Vec<&str> {
        self.list_values(IndicatorFamily::City)
    }

    pub fn list_zones(&self) -> Vec<&str> {
        self.zone_to_cities.keys().map(|z| z.as_str()).collect()
    }

    /// Sorted cities of `zone`. Callers should only pass zones from [`FeatureSchema::list_zones`].
    pub fn cities_for_zone(&self, zone: &str) -> Result<Vec<&str>, PricerError> {
        match self.zone_to_cities.get(zone) {
            Some(cities) => Ok(cities.iter().map(|c| c.as_str()).collect()),
            None => Err(PricerError::UnknownZone(zone.to_string(), self.list_zones().join("; "))),
        }
    }

    /// The zone `city` belongs to.
    pub fn zone_of_city(&self, city: &str) -> Option<&str> {
        self.zone_to_cities
            .iter()
            .find(|(_, cities)| cities.contains(city))
            .map(|(zone, _)| zone.as_str())
    }

    /// Upstream geographic consistency check. [`crate::builder::FeatureVectorBuilder`]
    /// does not call this, the display layer does before submitting.
    pub fn check_city_in_zone(&self, zone: &str, city: &str) -> Result<(), PricerError> {
        let cities = self
            .zone_to_cities
            .get(zone)
            .ok_or_else(|| PricerError::UnknownZone(zone.to_string(), self.list_zones().join("; ")))?;
        if cities.contains(city) {
            Ok(())
        } else {
            Err(PricerError::CityNotInZone {
                zone: zone.to_string(),
                city: city.to_string(),
            })
        }
    }

    /// Assert that artifact columns match the schema keys, position by position.
    pub fn check_columns(&self, columns: &[String]) -> Result<(), PricerError> {
        for (position, (expected, found)) in self.keys.iter().zip(columns.iter()).enumerate() {
            if expected != found {
                return Err(PricerError::ColumnOrderMismatch {
                    position,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        if columns.len() != self.keys.len() {
            return Err(PricerError::DimensionMismatch(
                "Feature schema".to_string(),
                self.keys.len(),
                columns.len(),
            ));
        }
        Ok(())
    }
}
