//! CSV import of measured or externally generated signals.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::signals::Signals;

#[derive(Debug, Error)]
pub enum SignalsCsvError {
    #[error("cannot open signals file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed signals CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct Row {
    time_hr: f64,
    solar_kw: f64,
    load_kw: f64,
    /// Empty cells are allowed for steps without a grid.
    price: Option<f64>,
    grid_available: Option<bool>,
}

/// Reads signals from a CSV file with a `time_hr,solar_kw,load_kw,price,grid_available`
/// header (any column order).
///
/// Values are not range-checked here; [`Signals::validate`] does that before
/// a run. A missing `grid_available` cell means available, a missing price
/// is read as NaN.
///
/// # Errors
///
/// Returns [`SignalsCsvError`] if the file cannot be opened or a row cannot
/// be parsed.
pub fn read_signals_csv(path: &Path) -> Result<Signals, SignalsCsvError> {
    let file = File::open(path)?;
    read_signals(file)
}

/// Reads signals as CSV from any reader.
///
/// # Errors
///
/// Returns [`SignalsCsvError::Csv`] if a row cannot be parsed.
pub fn read_signals(reader: impl Read) -> Result<Signals, SignalsCsvError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut signals = Signals::default();

    for row in rdr.deserialize() {
        let row: Row = row?;
        signals.time_hours.push(row.time_hr);
        signals.solar_kw.push(row.solar_kw);
        signals.load_kw.push(row.load_kw);
        signals.price.push(row.price.unwrap_or(f64::NAN));
        signals.grid_available.push(row.grid_available.unwrap_or(true));
    }
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_well_formed_rows() {
        let csv = "time_hr,solar_kw,load_kw,price,grid_available\n\
                   0.0,0.0,1.5,8.0,true\n\
                   0.5,1.2,1.4,9.5,true\n\
                   1.0,2.0,1.1,,false\n";
        let s = read_signals(csv.as_bytes()).expect("parse");
        assert_eq!(s.len(), 3);
        assert_eq!(s.time_hours, vec![0.0, 0.5, 1.0]);
        assert_eq!(s.solar_kw[1], 1.2);
        assert!(s.price[2].is_nan());
        assert!(!s.grid_available[2]);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn column_order_is_free() {
        let csv = "price,time_hr,load_kw,solar_kw,grid_available\n12.0,0.0,2.0,0.0,true\n";
        let s = read_signals(csv.as_bytes()).expect("parse");
        assert_eq!(s.price, vec![12.0]);
        assert_eq!(s.load_kw, vec![2.0]);
    }

    #[test]
    fn missing_availability_defaults_to_available() {
        let csv = "time_hr,solar_kw,load_kw,price,grid_available\n0.0,0.0,1.0,5.0,\n";
        let s = read_signals(csv.as_bytes()).expect("parse");
        assert_eq!(s.grid_available, vec![true]);
    }

    #[test]
    fn non_numeric_value_is_an_error() {
        let csv = "time_hr,solar_kw,load_kw,price,grid_available\n0.0,abc,1.0,5.0,true\n";
        assert!(matches!(
            read_signals(csv.as_bytes()),
            Err(SignalsCsvError::Csv(_))
        ));
    }

    #[test]
    fn nan_load_parses_but_fails_validation() {
        let csv = "time_hr,solar_kw,load_kw,price,grid_available\n0.0,0.0,NaN,5.0,true\n";
        let s = read_signals(csv.as_bytes()).expect("parse");
        assert!(s.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_signals_csv(Path::new("/nonexistent/signals.csv")).expect_err("must fail");
        assert!(matches!(err, SignalsCsvError::Io(_)));
    }
}
