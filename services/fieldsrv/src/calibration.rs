//! Calibration and measurement engine
//!
//! State machine per measurement session: select a circle, fix the centre,
//! verify the circle edge against the official radius, then measure throws.
//! Every step consumes an accepted dual reading from the rangefinder; the
//! engine refuses to advance on any fault and never substitutes a synthetic
//! value. Changing the circle type invalidates the whole chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use field_geometry::throw::{throw_coordinates, ThrowRecord};
use field_geometry::{horizontal_distance_mm, CentreFix, CircleType, EdgeResult, StationCoordinates};

use crate::error::{FieldError, Result};
use crate::manager::DeviceManager;

/// Session calibration state. Mutated only through the engine's operations.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationState {
    pub circle_type: CircleType,
    pub target_radius_m: f64,
    pub centre_set: bool,
    pub station: StationCoordinates,
    pub centre_timestamp: Option<DateTime<Utc>>,
    pub edge_verified: bool,
    pub edge_result: Option<EdgeResult>,
    /// Stamped at circle selection. Readings happen outside the state lock;
    /// a result is only written back when the session it was taken for is
    /// still the live one.
    #[serde(skip)]
    generation: u64,
}

impl CalibrationState {
    fn new(circle_type: CircleType, generation: u64) -> Self {
        Self {
            circle_type,
            target_radius_m: circle_type.official_radius_m(),
            centre_set: false,
            station: StationCoordinates::default(),
            centre_timestamp: None,
            edge_verified: false,
            edge_result: None,
            generation,
        }
    }
}

/// Drives the calibration chain against the rangefinder owned by the
/// device manager. One engine per measurement session.
pub struct CalibrationEngine {
    manager: Arc<DeviceManager>,
    state: Mutex<Option<CalibrationState>>,
    generation: AtomicU64,
}

impl CalibrationEngine {
    pub fn new(manager: Arc<DeviceManager>) -> Self {
        Self {
            manager,
            state: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Start (or restart) a session on the given circle. Any prior centre
    /// fix and edge verification are discarded, and readings still in
    /// flight for the previous session will be thrown away on write-back.
    pub async fn select_circle(&self, circle: CircleType) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;
        info!(circle = %circle, radius_m = circle.official_radius_m(), "Circle selected");
        *state = Some(CalibrationState::new(circle, generation));
    }

    /// Snapshot of the current session state.
    pub async fn state(&self) -> Option<CalibrationState> {
        self.state.lock().await.clone()
    }

    /// Fix the circle centre: one accepted dual reading anchors the station
    /// as the coordinate origin. The state is untouched when no reliable
    /// reading can be obtained.
    pub async fn set_centre(&self) -> Result<CentreFix> {
        let generation = {
            let state = self.state.lock().await;
            state
                .as_ref()
                .ok_or_else(|| FieldError::calibration("No circle selected"))?
                .generation
        };

        // Reading happens outside the state lock; a failure here must leave
        // the session exactly as it was.
        let reading = self
            .manager
            .reliable_edm_reading()
            .await
            .map_err(|e| FieldError::calibration(format!("Centre fix failed: {e}")))?;

        let fix = CentreFix {
            station: StationCoordinates::default(),
            fixed_at: Utc::now(),
        };

        let mut state = self.state.lock().await;
        let state = state
            .as_mut()
            .ok_or_else(|| FieldError::calibration("No circle selected"))?;
        if state.generation != generation {
            return Err(FieldError::calibration(
                "Circle changed during centre fix, reading discarded",
            ));
        }
        state.station = fix.station;
        state.centre_timestamp = Some(fix.fixed_at);
        state.centre_set = true;
        state.edge_verified = false;
        state.edge_result = None;

        info!(
            slope_mm = reading.slope_distance_mm,
            circle = %state.circle_type,
            "Centre fixed, station anchored as origin"
        );
        Ok(fix)
    }

    /// Verify the circle edge against the official radius. The result is
    /// recorded either way; measurement unlocks only within tolerance.
    pub async fn verify_edge(&self) -> Result<EdgeResult> {
        let generation = {
            let state = self.state.lock().await;
            let state = state
                .as_ref()
                .ok_or_else(|| FieldError::calibration("No circle selected"))?;
            if !state.centre_set {
                return Err(FieldError::calibration("Centre not set"));
            }
            state.generation
        };

        let reading = self.manager.reliable_edm_reading().await?;
        let hd_mm = horizontal_distance_mm(reading.slope_distance_mm, reading.vertical_angle_deg);
        let measured_radius_m = hd_mm / 1000.0;

        let mut state = self.state.lock().await;
        let state = state
            .as_mut()
            .ok_or_else(|| FieldError::calibration("No circle selected"))?;
        if state.generation != generation || !state.centre_set {
            return Err(FieldError::calibration(
                "Circle changed during edge verification, reading discarded",
            ));
        }
        let result = EdgeResult::evaluate(state.circle_type, measured_radius_m);
        state.edge_result = Some(result);
        state.edge_verified = result.within_tolerance;

        info!(
            circle = %state.circle_type,
            measured_radius_m = result.measured_radius_m,
            difference_mm = result.difference_mm,
            within_tolerance = result.within_tolerance,
            "Edge verification"
        );
        Ok(result)
    }

    /// Measure one throw. Requires a verified edge; calibration state is
    /// not mutated.
    pub async fn measure_throw(
        &self,
        athlete_id: Option<String>,
        round: Option<u8>,
    ) -> Result<ThrowRecord> {
        let (circle_type, generation) = {
            let state = self.state.lock().await;
            let state = state
                .as_ref()
                .ok_or_else(|| FieldError::calibration("No circle selected"))?;
            if !state.edge_verified {
                return Err(FieldError::calibration("Edge not verified"));
            }
            (state.circle_type, state.generation)
        };

        let reading = self.manager.reliable_edm_reading().await?;

        {
            let state = self.state.lock().await;
            let still_valid = state
                .as_ref()
                .is_some_and(|s| s.generation == generation && s.edge_verified);
            if !still_valid {
                return Err(FieldError::calibration(
                    "Circle changed during measurement, reading discarded",
                ));
            }
        }
        let hd_m =
            horizontal_distance_mm(reading.slope_distance_mm, reading.vertical_angle_deg) / 1000.0;
        let (x, y) = throw_coordinates(hd_m, reading.horizontal_angle_deg);

        let record = ThrowRecord {
            x,
            y,
            distance_m: hd_m,
            circle_type,
            timestamp_utc: Utc::now(),
            athlete_id,
            round,
        };
        info!(distance_m = record.distance_m, circle = %circle_type, "Throw measured");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceRole;
    use crate::transport::MockTransport;

    /// EDM frame with the given slope distance (mm), aimed level so the
    /// vertical reduction is the identity (sin 90 deg = 1).
    fn level_frame(slope_mm: u32) -> Vec<u8> {
        format!("{slope_mm:07} 0900000 0000000 83\r\n").into_bytes()
    }

    async fn engine_with_frames(frames: Vec<Vec<u8>>) -> CalibrationEngine {
        let manager = Arc::new(DeviceManager::new());
        let mock = MockTransport::with_responses(frames);
        manager
            .connect_with(DeviceRole::Edm, "edm_generic", Box::new(mock))
            .await
            .unwrap();
        CalibrationEngine::new(manager)
    }

    #[tokio::test]
    async fn verify_edge_before_centre_is_refused() {
        let engine = engine_with_frames(vec![]).await;
        engine.select_circle(CircleType::Shot).await;
        let err = engine.verify_edge().await.unwrap_err();
        assert!(matches!(err, FieldError::CalibrationError(_)));
    }

    #[tokio::test]
    async fn operations_without_circle_are_refused() {
        let engine = engine_with_frames(vec![]).await;
        assert!(matches!(
            engine.set_centre().await.unwrap_err(),
            FieldError::CalibrationError(_)
        ));
        assert!(matches!(
            engine.verify_edge().await.unwrap_err(),
            FieldError::CalibrationError(_)
        ));
        assert!(matches!(
            engine.measure_throw(None, None).await.unwrap_err(),
            FieldError::CalibrationError(_)
        ));
    }

    #[tokio::test]
    async fn full_chain_shot_circle() {
        // Centre pair, edge pair (1.0700 m) and throw pair (21.340 m)
        let engine = engine_with_frames(vec![
            level_frame(1500),
            level_frame(1500),
            level_frame(1070),
            level_frame(1070),
            level_frame(21_340),
            level_frame(21_340),
        ])
        .await;

        engine.select_circle(CircleType::Shot).await;
        engine.set_centre().await.unwrap();

        let edge = engine.verify_edge().await.unwrap();
        assert!((edge.measured_radius_m - 1.0700).abs() < 1e-9);
        assert!((edge.difference_mm - 2.5).abs() < 1e-9);
        assert!(edge.within_tolerance);

        let record = engine.measure_throw(Some("123".into()), Some(1)).await.unwrap();
        assert!((record.distance_m - 21.340).abs() < 1e-9);
        assert_eq!(record.circle_type, CircleType::Shot);
        assert_eq!(record.athlete_id.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn failing_edge_is_recorded_but_does_not_unlock() {
        let engine = engine_with_frames(vec![
            level_frame(1500),
            level_frame(1500),
            level_frame(1080),
            level_frame(1080),
        ])
        .await;

        engine.select_circle(CircleType::Shot).await;
        engine.set_centre().await.unwrap();

        let edge = engine.verify_edge().await.unwrap();
        assert!((edge.difference_mm - 12.5).abs() < 1e-9);
        assert!(!edge.within_tolerance);

        let state = engine.state().await.unwrap();
        assert!(!state.edge_verified);
        assert!(state.edge_result.is_some());

        let err = engine.measure_throw(None, None).await.unwrap_err();
        assert!(matches!(err, FieldError::CalibrationError(_)));
    }

    #[tokio::test]
    async fn circle_change_resets_whole_chain() {
        let engine = engine_with_frames(vec![
            level_frame(1500),
            level_frame(1500),
            level_frame(1070),
            level_frame(1070),
        ])
        .await;

        engine.select_circle(CircleType::Shot).await;
        engine.set_centre().await.unwrap();
        engine.verify_edge().await.unwrap();
        assert!(engine.state().await.unwrap().edge_verified);

        engine.select_circle(CircleType::Discus).await;
        let state = engine.state().await.unwrap();
        assert_eq!(state.circle_type, CircleType::Discus);
        assert!((state.target_radius_m - 1.250).abs() < 1e-12);
        assert!(!state.centre_set);
        assert!(!state.edge_verified);
        assert!(state.edge_result.is_none());

        let err = engine.verify_edge().await.unwrap_err();
        assert!(matches!(err, FieldError::CalibrationError(_)));
    }

    #[tokio::test]
    async fn circle_change_during_edge_verification_discards_the_reading() {
        let engine = Arc::new(
            engine_with_frames(vec![
                level_frame(1500),
                level_frame(1500),
                level_frame(1070),
                level_frame(1070),
            ])
            .await,
        );

        engine.select_circle(CircleType::Shot).await;
        engine.set_centre().await.unwrap();

        // Land the circle change inside the inter-read window
        let verify = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.verify_edge().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        engine.select_circle(CircleType::Hammer).await;

        let result = verify.await.unwrap();
        assert!(matches!(result, Err(FieldError::CalibrationError(_))));

        // The fresh session is untouched by the stale reading
        let state = engine.state().await.unwrap();
        assert_eq!(state.circle_type, CircleType::Hammer);
        assert!(!state.centre_set);
        assert!(!state.edge_verified);
        assert!(state.edge_result.is_none());
        assert!(matches!(
            engine.measure_throw(None, None).await.unwrap_err(),
            FieldError::CalibrationError(_)
        ));
    }

    #[tokio::test]
    async fn circle_change_during_centre_fix_discards_the_fix() {
        let engine = Arc::new(
            engine_with_frames(vec![level_frame(1500), level_frame(1500)]).await,
        );
        engine.select_circle(CircleType::Shot).await;

        let centre = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.set_centre().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        engine.select_circle(CircleType::Discus).await;

        let result = centre.await.unwrap();
        assert!(matches!(result, Err(FieldError::CalibrationError(_))));
        let state = engine.state().await.unwrap();
        assert_eq!(state.circle_type, CircleType::Discus);
        assert!(!state.centre_set);
        assert!(state.centre_timestamp.is_none());
    }

    #[tokio::test]
    async fn unreliable_centre_reading_leaves_state_unchanged() {
        // The pair disagrees by 10 mm
        let engine = engine_with_frames(vec![level_frame(1500), level_frame(1510)]).await;

        engine.select_circle(CircleType::Hammer).await;
        let err = engine.set_centre().await.unwrap_err();
        assert!(matches!(err, FieldError::CalibrationError(_)));

        let state = engine.state().await.unwrap();
        assert!(!state.centre_set);
        assert!(state.centre_timestamp.is_none());
    }
}
