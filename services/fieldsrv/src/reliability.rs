//! Dual-read agreement for distance measurements
//!
//! A mark is only accepted when two consecutive rangefinder readings agree
//! on slope distance within a fixed tolerance. Agreement yields the mean of
//! the pair; disagreement is surfaced as a tolerance error so the operator
//! re-sights rather than recording a glitched value.

use std::time::Duration;

use crate::error::{FieldError, Result};
use crate::protocols::EdmReading;

/// Maximum slope-distance spread between the two readings, in millimetres.
/// The bound is inclusive.
pub const AGREEMENT_TOLERANCE_MM: f64 = 3.0;

/// Pause between the two reads of a pair.
pub const READ_SPACING: Duration = Duration::from_millis(100);

/// Mean of two angles in degrees, correct across the 0/360 seam.
fn mean_angle_deg(a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi - lo > 180.0 {
        ((lo + 360.0 + hi) / 2.0) % 360.0
    } else {
        (lo + hi) / 2.0
    }
}

/// Combine a read pair into one accepted reading, or reject the pair.
///
/// Angles are averaged alongside the distance; the status code is taken
/// from the first reading.
pub fn merge_pair(first: &EdmReading, second: &EdmReading) -> Result<EdmReading> {
    let spread_mm = (first.slope_distance_mm - second.slope_distance_mm).abs();
    if spread_mm > AGREEMENT_TOLERANCE_MM {
        return Err(FieldError::tolerance(format!(
            "Readings disagree by {spread_mm:.1} mm (limit {AGREEMENT_TOLERANCE_MM:.1} mm): {:.0} vs {:.0}",
            first.slope_distance_mm, second.slope_distance_mm
        )));
    }

    Ok(EdmReading {
        slope_distance_mm: (first.slope_distance_mm + second.slope_distance_mm) / 2.0,
        vertical_angle_deg: mean_angle_deg(first.vertical_angle_deg, second.vertical_angle_deg),
        horizontal_angle_deg: mean_angle_deg(
            first.horizontal_angle_deg,
            second.horizontal_angle_deg,
        ),
        status_code: first.status_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(slope_mm: f64) -> EdmReading {
        EdmReading {
            slope_distance_mm: slope_mm,
            vertical_angle_deg: 87.0,
            horizontal_angle_deg: 120.0,
            status_code: 83,
        }
    }

    #[test]
    fn agreeing_pair_yields_mean() {
        let merged = merge_pair(&reading(21_340.0), &reading(21_342.0)).unwrap();
        assert!((merged.slope_distance_mm - 21_341.0).abs() < 1e-9);
        assert_eq!(merged.status_code, 83);
    }

    #[test]
    fn spread_at_tolerance_is_accepted() {
        assert!(merge_pair(&reading(21_340.0), &reading(21_343.0)).is_ok());
    }

    #[test]
    fn spread_over_tolerance_is_rejected() {
        let err = merge_pair(&reading(21_340.0), &reading(21_343.001)).unwrap_err();
        assert!(matches!(err, FieldError::ToleranceError(_)));
    }

    #[test]
    fn order_does_not_matter() {
        let a = reading(21_345.0);
        let b = reading(21_343.5);
        let m1 = merge_pair(&a, &b).unwrap();
        let m2 = merge_pair(&b, &a).unwrap();
        assert!((m1.slope_distance_mm - m2.slope_distance_mm).abs() < 1e-9);
    }

    #[test]
    fn angle_mean_handles_north_seam() {
        let mut a = reading(10_000.0);
        let mut b = reading(10_000.0);
        a.horizontal_angle_deg = 359.8;
        b.horizontal_angle_deg = 0.2;
        let merged = merge_pair(&a, &b).unwrap();
        assert!(
            merged.horizontal_angle_deg < 0.5 || merged.horizontal_angle_deg > 359.5,
            "got {}",
            merged.horizontal_angle_deg
        );
    }
}
