//! field-geometry - Circle geometry for athletics throws officiating
//!
//! Provides the UKA/WA circle radius and tolerance table, slope-to-horizontal
//! distance reduction, and edge verification arithmetic. Pure computation,
//! no I/O: the device service converts raw instrument readings into these
//! types and everything downstream works in validated geometry.
//!
//! # Example
//!
//! ```rust
//! use field_geometry::{CircleType, EdgeResult, horizontal_distance_mm};
//!
//! // A slope distance of 20 m aimed 87 degrees below the instrument axis
//! let hd = horizontal_distance_mm(20_000.0, 87.0);
//! assert!((hd - 20_000.0 * 87.0_f64.to_radians().sin()).abs() < 1e-9);
//!
//! // Edge check against the shot circle
//! let result = EdgeResult::evaluate(CircleType::Shot, 1.0700);
//! assert!(result.within_tolerance);
//! assert!((result.difference_mm - 2.5).abs() < 1e-9);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod throw;

pub use throw::{throw_coordinates, ThrowRecord};

/// Throwing circle families with fixed UKA/WA dimensions.
///
/// Radius and tolerance are competition constants, never derived from
/// configuration or input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircleType {
    Shot,
    Discus,
    Hammer,
    JavelinArc,
}

impl CircleType {
    /// Official circle radius in metres.
    pub const fn official_radius_m(self) -> f64 {
        match self {
            CircleType::Shot | CircleType::Hammer => 1.0675,
            CircleType::Discus => 1.250,
            CircleType::JavelinArc => 8.000,
        }
    }

    /// Permitted radial deviation in millimetres when verifying the circle edge.
    pub const fn tolerance_mm(self) -> f64 {
        match self {
            CircleType::JavelinArc => 10.0,
            _ => 5.0,
        }
    }

    pub fn all() -> [CircleType; 4] {
        [
            CircleType::Shot,
            CircleType::Discus,
            CircleType::Hammer,
            CircleType::JavelinArc,
        ]
    }
}

impl std::fmt::Display for CircleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircleType::Shot => "shot",
            CircleType::Discus => "discus",
            CircleType::Hammer => "hammer",
            CircleType::JavelinArc => "javelin_arc",
        };
        write!(f, "{name}")
    }
}

/// Reduce a slope distance to the horizontal plane.
///
/// `vertical_deg` is the vertical angle reported by the instrument; the
/// horizontal component is `slope * sin(angle)`. The same reduction is used
/// for edge verification and throw measurement so the two stay consistent.
pub fn horizontal_distance_mm(slope_distance_mm: f64, vertical_deg: f64) -> f64 {
    slope_distance_mm * vertical_deg.to_radians().sin()
}

/// Outcome of an edge verification measurement. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    /// Radius derived from the instrument reading, metres.
    pub measured_radius_m: f64,
    /// Signed deviation from the official radius, millimetres.
    pub difference_mm: f64,
    /// True when |difference| is inside the circle's tolerance.
    pub within_tolerance: bool,
}

impl EdgeResult {
    /// Compare a measured radius against a circle's official dimensions.
    pub fn evaluate(circle: CircleType, measured_radius_m: f64) -> Self {
        let difference_mm = (measured_radius_m - circle.official_radius_m()) * 1000.0;
        Self {
            measured_radius_m,
            difference_mm,
            within_tolerance: difference_mm.abs() <= circle.tolerance_mm(),
        }
    }
}

/// Station coordinates anchored when the circle centre is set.
///
/// By convention the instrument station becomes the origin once `set_centre`
/// succeeds; no further transform is applied to the centre reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StationCoordinates {
    pub x: f64,
    pub y: f64,
}

/// Timestamped centre fix, recorded when calibration anchors the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentreFix {
    pub station: StationCoordinates,
    pub fixed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_table_matches_uka_standard() {
        assert_eq!(CircleType::Shot.official_radius_m(), 1.0675);
        assert_eq!(CircleType::Hammer.official_radius_m(), 1.0675);
        assert_eq!(CircleType::Discus.official_radius_m(), 1.250);
        assert_eq!(CircleType::JavelinArc.official_radius_m(), 8.000);

        assert_eq!(CircleType::Shot.tolerance_mm(), 5.0);
        assert_eq!(CircleType::Discus.tolerance_mm(), 5.0);
        assert_eq!(CircleType::Hammer.tolerance_mm(), 5.0);
        assert_eq!(CircleType::JavelinArc.tolerance_mm(), 10.0);
    }

    #[test]
    fn horizontal_distance_is_slope_times_sine() {
        let slope = 12_345.6;
        for deg in [-92.5, -45.0, 0.0, 30.0, 87.25, 92.5] {
            let expected = slope * (deg as f64).to_radians().sin();
            assert!((horizontal_distance_mm(slope, deg) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn horizontal_distance_symmetric_under_angle_sign() {
        // sin(-x) == -sin(x): an angle-sign error flips the sign but keeps
        // the magnitude, within floating tolerance.
        let slope = 20_000.0;
        let plus = horizontal_distance_mm(slope, 87.0);
        let minus = horizontal_distance_mm(slope, -87.0);
        assert!((plus + minus).abs() < 1e-6);
    }

    #[test]
    fn edge_result_within_tolerance() {
        // 1.0700 against 1.0675 is +2.5 mm, inside the 5 mm band.
        let result = EdgeResult::evaluate(CircleType::Shot, 1.0700);
        assert!((result.difference_mm - 2.5).abs() < 1e-9);
        assert!(result.within_tolerance);
    }

    #[test]
    fn edge_result_out_of_tolerance() {
        // 1.0800 against 1.0675 is +12.5 mm, outside the 5 mm band.
        let result = EdgeResult::evaluate(CircleType::Shot, 1.0800);
        assert!((result.difference_mm - 12.5).abs() < 1e-9);
        assert!(!result.within_tolerance);
    }

    #[test]
    fn edge_result_boundary_is_inclusive() {
        let circle = CircleType::Discus;
        let at_limit = EdgeResult::evaluate(circle, circle.official_radius_m() + 0.005);
        assert!(at_limit.within_tolerance);

        let past_limit = EdgeResult::evaluate(circle, circle.official_radius_m() + 0.0051);
        assert!(!past_limit.within_tolerance);
    }

    #[test]
    fn javelin_arc_uses_wider_tolerance() {
        let result = EdgeResult::evaluate(CircleType::JavelinArc, 8.008);
        assert!(result.within_tolerance);

        let result = EdgeResult::evaluate(CircleType::JavelinArc, 8.011);
        assert!(!result.within_tolerance);
    }
}
