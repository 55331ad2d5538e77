//! EDM rangefinder codec
//!
//! The instrument answers a three-byte poll with one whitespace-delimited
//! ASCII line: slope distance in millimetres, vertical and horizontal
//! angles in sexagesimal `DDDMMSS`, and a status code. Angles are converted
//! to decimal degrees at decode time so everything downstream works in one
//! unit.

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};

/// Measurement trigger: DC1, CR, LF.
pub const POLL_COMMAND: &[u8] = &[0x11, 0x0D, 0x0A];

/// One decoded EDM transaction. Never mutated after the codec produces it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdmReading {
    pub slope_distance_mm: f64,
    pub vertical_angle_deg: f64,
    pub horizontal_angle_deg: f64,
    pub status_code: i32,
}

/// Convert a sexagesimal `DDDMMSS` field to decimal degrees.
///
/// `0872514` is 87 degrees 25 minutes 14 seconds. Minutes and seconds must
/// be below 60; the field must be exactly seven digits.
pub fn dddmmss_to_degrees(field: &str) -> Result<f64> {
    if field.len() != 7 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::protocol(format!(
            "Angle field is not 7-digit DDDMMSS: {field:?}"
        )));
    }

    let deg: f64 = field[..3]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad degrees in angle field {field:?}")))?;
    let min: f64 = field[3..5]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad minutes in angle field {field:?}")))?;
    let sec: f64 = field[5..7]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad seconds in angle field {field:?}")))?;

    if min >= 60.0 || sec >= 60.0 {
        return Err(FieldError::protocol(format!(
            "Minutes/seconds out of range in angle field {field:?}"
        )));
    }

    Ok(deg + min / 60.0 + sec / 3600.0)
}

/// Decode one response line into an [`EdmReading`].
pub fn decode_response(frame: &[u8]) -> Result<EdmReading> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| FieldError::protocol("EDM response is not valid ASCII"))?;

    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(FieldError::protocol(format!(
            "EDM response has {} fields, expected at least 4: {text:?}",
            fields.len()
        )));
    }

    let slope_distance_mm: f64 = fields[0].parse().map_err(|_| {
        FieldError::protocol(format!("Bad slope distance field: {:?}", fields[0]))
    })?;

    let vertical_angle_deg = dddmmss_to_degrees(fields[1])?;
    let horizontal_angle_deg = dddmmss_to_degrees(fields[2])?;

    let status_code: i32 = fields[3]
        .parse()
        .map_err(|_| FieldError::protocol(format!("Bad status code field: {:?}", fields[3])))?;

    if !(0..=9999).contains(&status_code) {
        return Err(FieldError::protocol(format!(
            "EDM status code out of range: {status_code}"
        )));
    }

    Ok(EdmReading {
        slope_distance_mm,
        vertical_angle_deg,
        horizontal_angle_deg,
        status_code,
    })
}
