//! Device simulators for demo mode and integration testing
//!
//! Each simulator is a small TCP server speaking one device protocol. They
//! exist strictly outside the live measurement path: demo mode wires the
//! manager to these endpoints instead of real hardware, and the live engine
//! never falls back to them on its own.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorExt, FieldError, Result};
use crate::protocols::scoreboard::{self, DecodedFrame};
use crate::protocols::{edm, wind, DeviceCodec, DeviceFamily};

/// Encode decimal degrees as the instrument's DDDMMSS field.
fn degrees_to_dddmmss(deg: f64) -> String {
    let total_seconds = (deg.abs() * 3600.0).round() as u64;
    let d = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{d:03}{m:02}{s:02}")
}

/// The reading a simulated rangefinder reports, identical on every poll so
/// dual reads always agree.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSight {
    pub slope_distance_mm: f64,
    pub vertical_angle_deg: f64,
    pub horizontal_angle_deg: f64,
    pub status_code: i32,
}

impl Default for SimulatedSight {
    fn default() -> Self {
        Self {
            slope_distance_mm: 21_340.0,
            vertical_angle_deg: 90.0,
            horizontal_angle_deg: 0.0,
            status_code: 83,
        }
    }
}

/// Simulated rangefinder: answers the standard poll with the configured sight.
pub struct EdmSimulator {
    sight: Arc<RwLock<SimulatedSight>>,
}

impl EdmSimulator {
    pub fn new() -> Self {
        Self {
            sight: Arc::new(RwLock::new(SimulatedSight::default())),
        }
    }

    /// Handle to re-aim the simulated instrument while it is running.
    pub fn sight(&self) -> Arc<RwLock<SimulatedSight>> {
        self.sight.clone()
    }

    pub async fn start(self) -> Result<SocketAddr> {
        let listener = bind_ephemeral().await?;
        let addr = listener.local_addr().map_err(FieldError::from)?;
        info!(addr = %addr, "EDM simulator listening");

        let sight = self.sight;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "EDM simulator connection");
                        let sight = sight.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_edm(stream, sight).await {
                                warn!(error = %e, "EDM simulator connection ended");
                            }
                        });
                    },
                    Err(e) => {
                        error!(error = %e, "EDM simulator accept failed");
                        break;
                    },
                }
            }
        });
        Ok(addr)
    }
}

impl Default for EdmSimulator {
    fn default() -> Self {
        Self::new()
    }
}

async fn serve_edm(mut stream: TcpStream, sight: Arc<RwLock<SimulatedSight>>) -> Result<()> {
    let mut buf = [0u8; 64];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if !buf[..n].ends_with(edm::POLL_COMMAND) {
            continue;
        }
        let s = *sight.read().await;
        let response = format!(
            "{:07} {} {} {:02}\r\n",
            s.slope_distance_mm.round() as u64,
            degrees_to_dddmmss(s.vertical_angle_deg),
            degrees_to_dddmmss(s.horizontal_angle_deg),
            s.status_code
        );
        stream.write_all(response.as_bytes()).await?;
    }
}

/// Simulated wind gauge speaking one of the four dialects.
pub struct WindSimulator {
    codec: DeviceCodec,
    speed_mps: Arc<RwLock<f64>>,
    direction_deg: f64,
}

impl WindSimulator {
    pub fn new(codec: DeviceCodec, speed_mps: f64) -> Result<Self> {
        if codec.family() != DeviceFamily::Wind {
            return Err(FieldError::config(format!(
                "{codec:?} is not a wind dialect"
            )));
        }
        Ok(Self {
            codec,
            speed_mps: Arc::new(RwLock::new(speed_mps)),
            direction_deg: 245.0,
        })
    }

    pub fn speed(&self) -> Arc<RwLock<f64>> {
        self.speed_mps.clone()
    }

    pub async fn start(self) -> Result<SocketAddr> {
        let listener = bind_ephemeral().await?;
        let addr = listener.local_addr().map_err(FieldError::from)?;
        info!(addr = %addr, codec = ?self.codec, "Wind simulator listening");

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let codec = self.codec;
                        let speed = self.speed_mps.clone();
                        let direction = self.direction_deg;
                        tokio::spawn(async move {
                            if let Err(e) = serve_wind(stream, codec, speed, direction).await {
                                warn!(error = %e, "Wind simulator connection ended");
                            }
                        });
                    },
                    Err(e) => {
                        error!(error = %e, "Wind simulator accept failed");
                        break;
                    },
                }
            }
        });
        Ok(addr)
    }
}

async fn serve_wind(
    mut stream: TcpStream,
    codec: DeviceCodec,
    speed: Arc<RwLock<f64>>,
    direction_deg: f64,
) -> Result<()> {
    let mut buf = [0u8; 64];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let speed_mps = *speed.read().await;
        let response = match codec {
            DeviceCodec::WindGeneric => format!("{speed_mps:+.1}\r\n"),
            DeviceCodec::WindGill => {
                format!("Q,1,{direction_deg:03.0},{speed_mps:.2},M,00,\r\n")
            },
            DeviceCodec::WindLynx => {
                format!("WS:{speed_mps:+.1},WD:{direction_deg:03.0}\r\n")
            },
            DeviceCodec::WindNmea => {
                let body = format!("WIMWV,{direction_deg:.1},R,{speed_mps:.1},M,A");
                format!("${body}*{:02X}\r\n", wind::nmea_checksum(&body))
            },
            _ => unreachable!("constructor rejects non-wind codecs"),
        };
        stream.write_all(response.as_bytes()).await?;
    }
}

/// Simulated scoreboard: acknowledges the handshake, validates every frame
/// and keeps the decoded frames for inspection.
pub struct ScoreboardSimulator {
    frames: Arc<RwLock<Vec<DecodedFrame>>>,
}

impl ScoreboardSimulator {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Frames received so far, in arrival order.
    pub fn frames(&self) -> Arc<RwLock<Vec<DecodedFrame>>> {
        self.frames.clone()
    }

    pub async fn start(self) -> Result<SocketAddr> {
        let listener = bind_ephemeral().await?;
        let addr = listener.local_addr().map_err(FieldError::from)?;
        info!(addr = %addr, "Scoreboard simulator listening");

        let frames = self.frames;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let frames = frames.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_scoreboard(stream, frames).await {
                                warn!(error = %e, "Scoreboard simulator connection ended");
                            }
                        });
                    },
                    Err(e) => {
                        error!(error = %e, "Scoreboard simulator accept failed");
                        break;
                    },
                }
            }
        });
        Ok(addr)
    }
}

impl Default for ScoreboardSimulator {
    fn default() -> Self {
        Self::new()
    }
}

async fn serve_scoreboard(
    mut stream: TcpStream,
    frames: Arc<RwLock<Vec<DecodedFrame>>>,
) -> Result<()> {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&buf[..n]);

        loop {
            if pending.first() == Some(&scoreboard::HANDSHAKE_REQUEST) {
                pending.remove(0);
                stream.write_all(&[scoreboard::HANDSHAKE_ACK]).await?;
                continue;
            }
            if pending.len() < scoreboard::FRAME_LEN {
                break;
            }
            let frame: Vec<u8> = pending.drain(..scoreboard::FRAME_LEN).collect();
            match scoreboard::decode_frame(&frame) {
                Ok(decoded) => frames.write().await.push(decoded),
                Err(e) => warn!(error = %e, "Scoreboard simulator rejected frame"),
            }
        }
    }
}

async fn bind_ephemeral() -> Result<TcpListener> {
    TcpListener::bind("127.0.0.1:0")
        .await
        .connection_error("Simulator bind failed")
}
