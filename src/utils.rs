use crate::constants::CURRENCY_SYMBOL;
use crate::errors::PricerError;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Calculate if a value is missing.
///
/// With a non-NaN `missing` marker, NaN in the data is not treated as missing
/// and falls through to the regular comparison.
#[inline]
pub fn is_missing(value: &f64, missing: &f64) -> bool {
    if missing.is_nan() {
        value.is_nan()
    } else {
        value == missing
    }
}

/// Format a price the way estimates are shown, e.g. `245300.00 €`.
pub fn format_price(price: f64) -> String {
    format!("{:.2} {}", price, CURRENCY_SYMBOL)
}

/// Read and parse a json file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PricerError> {
    let unreadable = |e: String| PricerError::UnableToRead(path.display().to_string(), e);
    let json_str = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    serde_json::from_str(&json_str).map_err(|e| unreadable(e.to_string()))
}

/// Read every record of a csv file with a header row.
///
/// Only an unreadable file or header fails the whole read. A malformed record
/// becomes an error in its own slot, so the others can still be used.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<Result<T, PricerError>>, PricerError> {
    let unreadable = |e: csv::Error| PricerError::UnableToRead(path.display().to_string(), e.to_string());
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_path(path).map_err(unreadable)?;
    reader.headers().map_err(unreadable)?;
    Ok(reader
        .deserialize()
        .enumerate()
        .map(|(i, record)| {
            record.map_err(|e| PricerError::UnableToRead(format!("{} record {}", path.display(), i + 1), e.to_string()))
        })
        .collect())
}

pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing() {
        assert!(is_missing(&f64::NAN, &f64::NAN));
        assert!(!is_missing(&1.0, &f64::NAN));
        assert!(is_missing(&-1.0, &-1.0));
        assert!(!is_missing(&f64::NAN, &-1.0));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.0), "0.00 €");
        assert_eq!(format_price(999.5), "999.50 €");
        assert_eq!(format_price(245300.126), "245300.13 €");
    }

    #[test]
    fn test_read_csv() {
        use crate::builder::RawInput;
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/inputs.csv");
        let inputs: Vec<RawInput> = read_csv(&path).unwrap().into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(inputs.len(), 4);
        assert_eq!(inputs[0].city, "Inca");
        assert!(!inputs[0].garden);
        assert!(inputs[1].swimming_pool);
        assert_eq!(inputs[2].house_type, " Casa rural");
        assert!(read_csv::<RawInput>(Path::new("does/not/exist.csv")).is_err());
    }

    #[test]
    fn test_read_csv_keeps_good_records() {
        use crate::builder::RawInput;
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/inputs_malformed.csv");
        let records: Vec<Result<RawInput, PricerError>> = read_csv(&path).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].as_ref().unwrap().city, "Inca");
        assert!(matches!(&records[1], Err(PricerError::UnableToRead(what, _)) if what.ends_with("record 2")));
        assert!(records[2].is_err());
        assert!(records[3].as_ref().unwrap().garden);
    }

    #[test]
    fn test_precision_round() {
        assert_eq!(precision_round(1.23456, 2), 1.23);
        assert_eq!(precision_round(-0.005, 1), -0.0);
    }
}
