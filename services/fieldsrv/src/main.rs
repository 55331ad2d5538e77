//! Field Event Measurement Service (fieldsrv)
//!
//! Connects the configured measurement devices, keeps the result cache
//! flushing in the background and runs until interrupted. Demo mode stands
//! up protocol simulators and walks one full calibration and measurement
//! pass against them.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use field_geometry::CircleType;
use fieldsrv::calibration::CalibrationEngine;
use fieldsrv::cache::{ResultCache, ResultPayload, SeriesEntry};
use fieldsrv::config::{DeviceConfig, DeviceRole, FieldConfig, TransportConfig};
use fieldsrv::manager::DeviceManager;
use fieldsrv::sim::{EdmSimulator, ScoreboardSimulator, WindSimulator};
use fieldsrv::protocols::DeviceCodec;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "fieldsrv", about = "Field event measurement service")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/fieldsrv.yaml")]
    config: String,

    /// Log filter, overridden by RUST_LOG when set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,

    /// Run against built-in simulators instead of real hardware
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.demo {
        return run_demo().await;
    }

    let config = FieldConfig::load(&args.config)?;
    if args.validate {
        info!("Configuration is valid");
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let manager = Arc::new(DeviceManager::new());
    for device in &config.devices {
        if let Err(e) = manager
            .connect_with_retry(device, CONNECT_ATTEMPTS, CONNECT_BACKOFF)
            .await
        {
            // A missing device must not take the whole session down; the
            // operator reconnects it once it is powered
            warn!(role = %device.role, error = %e, "Device unavailable at startup");
        }
    }

    let cache = Arc::new(ResultCache::open(
        config.upload.endpoint.clone(),
        &config.upload.cache_path,
    )?);
    let flush_task = cache.clone().spawn_flush_task(config.upload.retry_interval());

    info!(
        devices = manager.status().await.len(),
        pending_results = cache.pending().await,
        "fieldsrv running, Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    flush_task.abort();
    for role in [DeviceRole::Edm, DeviceRole::Wind, DeviceRole::Scoreboard] {
        if let Err(e) = manager.disconnect(role).await {
            error!(role = %role, error = %e, "Disconnect failed");
        }
    }
    Ok(())
}

/// One scripted officiating pass against local simulators. Shares no state
/// with a live session; everything lives and dies in this function.
async fn run_demo() -> anyhow::Result<()> {
    info!("Demo mode: starting simulators");

    let edm = EdmSimulator::new();
    let sight = edm.sight();
    let edm_addr = edm.start().await?;
    let wind_addr = WindSimulator::new(DeviceCodec::WindGeneric, 1.8)?.start().await?;
    let board = ScoreboardSimulator::new();
    let board_addr = board.start().await?;

    let manager = Arc::new(DeviceManager::new());
    for (role, protocol, addr) in [
        (DeviceRole::Edm, "edm_generic", edm_addr),
        (DeviceRole::Wind, "wind_generic", wind_addr),
        (DeviceRole::Scoreboard, "scoreboard_fd", board_addr),
    ] {
        manager
            .connect(&DeviceConfig {
                role,
                protocol: protocol.to_string(),
                transport: TransportConfig::Network {
                    host: addr.ip().to_string(),
                    port: addr.port(),
                },
                read_timeout_ms: 2_000,
            })
            .await?;
    }

    let engine = CalibrationEngine::new(manager.clone());
    engine.select_circle(CircleType::Shot).await;

    // Aim at the centre, then the circle edge, then the landing point
    sight.write().await.slope_distance_mm = 1_500.0;
    engine.set_centre().await?;

    sight.write().await.slope_distance_mm = 1_069.0;
    let edge = engine.verify_edge().await?;
    info!(
        measured_radius_m = edge.measured_radius_m,
        difference_mm = edge.difference_mm,
        "Edge verified"
    );

    sight.write().await.slope_distance_mm = 21_340.0;
    let throw = engine.measure_throw(Some("123".into()), Some(1)).await?;
    let wind = manager.measure_wind(3, Duration::from_millis(200)).await?;
    info!(distance_m = throw.distance_m, wind_mps = wind, "Throw measured");

    let mark = format!("{:.2}", throw.distance_m);
    manager.show_mark(&mark, "123", 1).await?;

    // Submission goes to the cache since no server is running in the demo
    let cache = ResultCache::open(
        "http://127.0.0.1:9/api/v1/results",
        std::env::temp_dir().join("fieldsrv-demo-cache.jsonl"),
    )?;
    cache
        .post_result(ResultPayload {
            event_id: "DEMO-SP".into(),
            athlete_bib: "123".into(),
            series: vec![SeriesEntry {
                attempt: 1,
                mark,
                unit: "m".into(),
                wind: Some(wind),
                valid: true,
            }],
        })
        .await?;
    info!(pending = cache.pending().await, "Demo complete");
    Ok(())
}
