pub const HOUSE_TYPE_PREFIX: &str = "house_type:";
pub const CITY_PREFIX: &str = "city:";
pub const ZONE_PREFIX: &str = "zone:";

pub const M2_REAL: &str = "m2_real";
pub const ROOM_NUM: &str = "room_num";
pub const BATH_NUM: &str = "bath_num";

pub const COLUMNS_FILE: &str = "columns.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";
pub const DEFAULT_ARTIFACT_DIR: &str = "resources/artifacts";

pub const DEFAULT_REFERENCE_SAMPLES: usize = 200;
pub const AMENITY_PROBABILITY: f64 = 0.35;
pub const SAMPLE_M2_RANGE: (f64, f64) = (30.0, 450.0);
pub const SAMPLE_ROOM_RANGE: (u32, u32) = (1, 7);
pub const SAMPLE_BATH_RANGE: (u32, u32) = (1, 5);

pub const PREDICTION_UNAVAILABLE: &str = "Prediction unavailable.";

pub const CURRENCY_SYMBOL: &str = "€";
pub const CHART_WIDTH: usize = 40;
