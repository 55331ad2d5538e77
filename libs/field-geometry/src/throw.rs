//! Throw records and landing-point coordinates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CircleType;

/// One measured throw. Appended to a session, never mutated afterwards;
/// heat-map and statistics consumers read these downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowRecord {
    /// Landing point relative to the station origin, metres.
    pub x: f64,
    pub y: f64,
    /// Horizontal distance from station to landing point, metres.
    pub distance_m: f64,
    pub circle_type: CircleType,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub athlete_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u8>,
}

/// Project a horizontal distance along a bearing into plane coordinates.
///
/// Bearing follows surveying convention: degrees clockwise from north, so
/// x is the easting (sin) and y the northing (cos).
pub fn throw_coordinates(horizontal_distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    let bearing = bearing_deg.to_radians();
    (
        horizontal_distance_m * bearing.sin(),
        horizontal_distance_m * bearing.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_along_cardinal_bearings() {
        let (x, y) = throw_coordinates(10.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!((y - 10.0).abs() < 1e-9);

        let (x, y) = throw_coordinates(10.0, 90.0);
        assert!((x - 10.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn coordinates_preserve_distance() {
        for bearing in [13.7, 101.0, 245.5, 359.0] {
            let (x, y) = throw_coordinates(42.42, bearing);
            assert!(((x * x + y * y).sqrt() - 42.42).abs() < 1e-9);
        }
    }

    #[test]
    fn throw_record_serializes_without_empty_optionals() {
        let record = ThrowRecord {
            x: 1.0,
            y: 2.0,
            distance_m: 2.236,
            circle_type: CircleType::Discus,
            timestamp_utc: Utc::now(),
            athlete_id: None,
            round: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("athlete_id"));
        assert!(!json.contains("round"));
    }
}
