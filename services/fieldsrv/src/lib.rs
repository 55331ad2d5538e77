//! Field Event Measurement Service (fieldsrv)
//!
//! Operates the measurement hardware used in athletics throws officiating:
//! an EDM rangefinder, a wind gauge and a results scoreboard, each reachable
//! over a serial link or a TCP socket. Raw instrument readings are turned
//! into validated circle geometry and throw distances under strict tolerance
//! rules; results are pushed to a competition server through a durable,
//! restart-surviving retry cache.
//!
//! # Architecture
//!
//! - **`transport`**: byte-level duplex channels (serial, TCP) with
//!   per-operation timeouts, plus a scripted mock for tests
//! - **`protocols`**: per-device-family codecs behind a closed dispatch
//!   enum: EDM reading parser, four wind-gauge dialects, scoreboard
//!   7-segment frame encoder with checksum framing and handshake
//! - **`manager`**: one live connection per device role, all traffic per
//!   role serialized
//! - **`calibration`**: the circle state machine: select circle, fix
//!   centre, verify edge, measure throws
//! - **`reliability`**: dual-read agreement on every accepted distance
//! - **`cache`**: durable FIFO of unacknowledged result submissions
//! - **`sim`**: protocol simulators for demo mode and integration tests,
//!   never reachable from the live measurement path
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use field_geometry::CircleType;
//! use fieldsrv::calibration::CalibrationEngine;
//! use fieldsrv::config::{DeviceRole, FieldConfig};
//! use fieldsrv::error::Result;
//! use fieldsrv::manager::DeviceManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = FieldConfig::load("config/fieldsrv.yaml")?;
//!     let manager = Arc::new(DeviceManager::new());
//!     if let Some(edm) = config.device(DeviceRole::Edm) {
//!         manager.connect(edm).await?;
//!     }
//!
//!     let engine = CalibrationEngine::new(manager);
//!     engine.select_circle(CircleType::Shot).await;
//!     engine.set_centre().await?;
//!     let edge = engine.verify_edge().await?;
//!     assert!(edge.within_tolerance);
//!
//!     let throw = engine.measure_throw(Some("123".into()), Some(1)).await?;
//!     println!("{:.2} m", throw.distance_m);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod manager;
pub mod protocols;
pub mod reliability;
pub mod sim;
pub mod transport;

pub use cache::{ResultCache, ResultPayload, SeriesEntry};
pub use calibration::CalibrationEngine;
pub use config::{DeviceRole, FieldConfig};
pub use error::{FieldError, Result};
pub use manager::DeviceManager;
