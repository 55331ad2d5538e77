//! End-to-end session tests against the protocol simulators
//!
//! Everything here runs over real loopback sockets: the manager connects the
//! way it would to hardware, and the simulators speak the device protocols
//! byte for byte.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use field_geometry::CircleType;
use fieldsrv::calibration::CalibrationEngine;
use fieldsrv::config::{DeviceConfig, DeviceRole, TransportConfig};
use fieldsrv::manager::DeviceManager;
use fieldsrv::protocols::scoreboard::{CONTROL_ATHLETE, CONTROL_MARK};
use fieldsrv::protocols::DeviceCodec;
use fieldsrv::sim::{EdmSimulator, ScoreboardSimulator, WindSimulator};
use fieldsrv::FieldError;

fn network_device(role: DeviceRole, protocol: &str, addr: SocketAddr) -> DeviceConfig {
    DeviceConfig {
        role,
        protocol: protocol.to_string(),
        transport: TransportConfig::Network {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        read_timeout_ms: 2_000,
    }
}

#[tokio::test]
async fn full_calibration_and_measurement_session() {
    let edm = EdmSimulator::new();
    let sight = edm.sight();
    let addr = edm.start().await.unwrap();

    let manager = Arc::new(DeviceManager::new());
    manager
        .connect(&network_device(DeviceRole::Edm, "edm_generic", addr))
        .await
        .unwrap();

    let engine = CalibrationEngine::new(manager);
    engine.select_circle(CircleType::Discus).await;

    sight.write().await.slope_distance_mm = 1_800.0;
    engine.set_centre().await.unwrap();

    // Aimed at the discus circle edge, 1.2520 m
    sight.write().await.slope_distance_mm = 1_252.0;
    let edge = engine.verify_edge().await.unwrap();
    assert!((edge.measured_radius_m - 1.2520).abs() < 1e-9);
    assert!((edge.difference_mm - 2.0).abs() < 1e-9);
    assert!(edge.within_tolerance);

    sight.write().await.slope_distance_mm = 58_420.0;
    let throw = engine.measure_throw(Some("42".into()), Some(3)).await.unwrap();
    assert!((throw.distance_m - 58.420).abs() < 1e-9);
    assert_eq!(throw.circle_type, CircleType::Discus);
    assert_eq!(throw.round, Some(3));
}

#[tokio::test]
async fn wind_dialects_agree_on_speed() {
    for codec in [
        DeviceCodec::WindGeneric,
        DeviceCodec::WindGill,
        DeviceCodec::WindLynx,
        DeviceCodec::WindNmea,
    ] {
        let protocol = match codec {
            DeviceCodec::WindGeneric => "wind_generic",
            DeviceCodec::WindGill => "wind_gill",
            DeviceCodec::WindLynx => "wind_lynx",
            DeviceCodec::WindNmea => "wind_nmea",
            _ => unreachable!(),
        };
        let addr = WindSimulator::new(codec, 2.5).unwrap().start().await.unwrap();

        let manager = DeviceManager::new();
        manager
            .connect(&network_device(DeviceRole::Wind, protocol, addr))
            .await
            .unwrap();

        let reading = manager.read_wind().await.unwrap();
        assert!(
            (reading.speed_mps - 2.5).abs() < 0.06,
            "{protocol}: got {}",
            reading.speed_mps
        );

        let mean = manager
            .measure_wind(3, Duration::from_millis(10))
            .await
            .unwrap();
        assert!((mean - 2.5).abs() < 0.06, "{protocol}: mean {mean}");
    }
}

#[tokio::test]
async fn scoreboard_receives_validated_frame_pairs() {
    let board = ScoreboardSimulator::new();
    let frames = board.frames();
    let addr = board.start().await.unwrap();

    let manager = DeviceManager::new();
    manager
        .connect(&network_device(DeviceRole::Scoreboard, "scoreboard_fd", addr))
        .await
        .unwrap();

    manager.show_mark("21.34", "123", 1).await.unwrap();
    manager.show_mark("22.07", "123", 2).await.unwrap();

    // The simulator validates checksums before recording anything
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if frames.read().await.len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("simulator never saw all four frames");

    let frames = frames.read().await;
    assert_eq!(frames[0].control, CONTROL_MARK);
    assert_eq!(frames[1].control, CONTROL_ATHLETE);
    assert_eq!(frames[0].tag, frames[1].tag);

    // The second update carries the next tag in the sequence
    assert_eq!(frames[2].tag, frames[0].tag.wrapping_add(0x10));
    assert_eq!(frames[2].control, CONTROL_MARK);
    assert_eq!(frames[3].control, CONTROL_ATHLETE);
}

#[tokio::test]
async fn unreachable_device_reports_connection_error() {
    let manager = DeviceManager::new();
    let err = manager
        .connect(&DeviceConfig {
            role: DeviceRole::Edm,
            protocol: "edm_generic".to_string(),
            transport: TransportConfig::Network {
                host: "127.0.0.1".to_string(),
                // Discard port, nothing listens there
                port: 9,
            },
            read_timeout_ms: 500,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FieldError::ConnectionError(_) | FieldError::TimeoutError(_)
    ));
}
