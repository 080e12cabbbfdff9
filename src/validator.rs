//! Structural checks for uploaded equipment CSV files.
//!
//! Validation is a read-only pass over the upload bytes. The analyzer makes its
//! own pass over the same slice afterwards.

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::debug;

use crate::domain::{NUMERIC_COLUMNS, REQUIRED_COLUMNS};
use crate::error::ServiceError;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Column '{column}' must contain only numeric values")]
    NonNumeric { column: String },

    #[error("Error reading CSV: {0}")]
    Unreadable(String),
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation {
            message: err.to_string(),
        }
    }
}

/// Positions of the required columns inside a header row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColumnPositions {
    pub equipment_name: usize,
    pub equipment_type: usize,
    pub flowrate: usize,
    pub pressure: usize,
    pub temperature: usize,
}

impl ColumnPositions {
    pub(crate) fn numeric(&self) -> [(&'static str, usize); 3] {
        [
            (NUMERIC_COLUMNS[0], self.flowrate),
            (NUMERIC_COLUMNS[1], self.pressure),
            (NUMERIC_COLUMNS[2], self.temperature),
        ]
    }
}

pub(crate) fn csv_reader(input: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new().trim(Trim::All).from_reader(input)
}

fn header_name(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}').trim()
}

/// Resolves required columns by exact name, or lists those that are absent in
/// their canonical order.
pub(crate) fn locate_columns(headers: &StringRecord) -> Result<ColumnPositions, ValidationError> {
    let position = |name: &str| headers.iter().position(|h| header_name(h) == name);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| position(name).is_none())
        .map(|name| name.to_string())
        .collect();

    match (
        position(REQUIRED_COLUMNS[0]),
        position(REQUIRED_COLUMNS[1]),
        position(REQUIRED_COLUMNS[2]),
        position(REQUIRED_COLUMNS[3]),
        position(REQUIRED_COLUMNS[4]),
    ) {
        (Some(equipment_name), Some(equipment_type), Some(flowrate), Some(pressure), Some(temperature)) => {
            Ok(ColumnPositions {
                equipment_name,
                equipment_type,
                flowrate,
                pressure,
                temperature,
            })
        }
        _ => Err(ValidationError::MissingColumns(missing)),
    }
}

/// Finite decimal or integer literal. Empty cells, `NaN` and infinities fail.
pub(crate) fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn validate_csv(input: &[u8]) -> Result<(), ValidationError> {
    let mut reader = csv_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| ValidationError::Unreadable(e.to_string()))?
        .clone();

    if headers.iter().all(|h| header_name(h).is_empty()) {
        return Err(ValidationError::Unreadable(
            "No columns to parse from file".to_string(),
        ));
    }

    let positions = locate_columns(&headers)?;

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| ValidationError::Unreadable(e.to_string()))?;
        for (column, index) in positions.numeric() {
            let cell = record.get(index).unwrap_or("");
            if parse_numeric(cell).is_none() {
                return Err(ValidationError::NonNumeric {
                    column: column.to_string(),
                });
            }
        }
        rows += 1;
    }

    debug!("CSV validated: {} rows", rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n";

    #[test]
    fn accepts_well_formed_file() {
        let csv = format!("{HEADER}P-100,Pump,10,5,25\nV-1,Valve,5.5,3,20\n");
        assert_eq!(validate_csv(csv.as_bytes()), Ok(()));
    }

    #[test]
    fn names_exactly_the_missing_columns() {
        let csv = "Equipment Name,Flowrate,Temperature\nP-1,1,2\n";
        assert_eq!(
            validate_csv(csv.as_bytes()),
            Err(ValidationError::MissingColumns(vec![
                "Type".to_string(),
                "Pressure".to_string()
            ]))
        );
    }

    #[test]
    fn missing_columns_message_lists_names() {
        let err = validate_csv(b"Equipment Name,Type\nP-1,Pump\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required columns: Flowrate, Pressure, Temperature"
        );
    }

    #[test]
    fn rejects_non_numeric_value() {
        let csv = format!("{HEADER}P-100,Pump,10,high,25\n");
        let err = validate_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonNumeric {
                column: "Pressure".to_string()
            }
        );
        assert_eq!(err.to_string(), "Column 'Pressure' must contain only numeric values");
    }

    #[test]
    fn empty_cell_is_not_numeric() {
        let csv = format!("{HEADER}P-100,Pump,,5,25\n");
        assert_eq!(
            validate_csv(csv.as_bytes()),
            Err(ValidationError::NonNumeric {
                column: "Flowrate".to_string()
            })
        );
    }

    #[test]
    fn nan_is_not_numeric() {
        let csv = format!("{HEADER}P-100,Pump,1,5,NaN\n");
        assert!(matches!(
            validate_csv(csv.as_bytes()),
            Err(ValidationError::NonNumeric { .. })
        ));
    }

    #[test]
    fn ragged_rows_are_unreadable() {
        let csv = format!("{HEADER}P-100,Pump,10,5\n");
        assert!(matches!(
            validate_csv(csv.as_bytes()),
            Err(ValidationError::Unreadable(_))
        ));
    }

    #[test]
    fn empty_input_is_unreadable() {
        assert_eq!(
            validate_csv(b""),
            Err(ValidationError::Unreadable(
                "No columns to parse from file".to_string()
            ))
        );
    }

    #[test]
    fn tolerates_extra_columns_and_padding() {
        let csv = "\u{feff}Type , Equipment Name,Notes,Flowrate,Pressure,Temperature\nPump,P-1,spare, 1.5 ,2,3\n";
        assert_eq!(validate_csv(csv.as_bytes()), Ok(()));
    }

    #[test]
    fn header_only_file_passes_validation() {
        assert_eq!(validate_csv(HEADER.as_bytes()), Ok(()));
    }
}
