//! Device connection manager
//!
//! Owns the live connections for the three device roles and serialises all
//! traffic per device: each active device sits behind its own mutex, so a
//! measurement transaction (poll, accumulate, decode) is atomic with respect
//! to other callers. Roles are exclusive, a second connect on an occupied
//! role is refused rather than silently replacing the link.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{DeviceConfig, DeviceRole, TransportConfig};
use crate::error::{FieldError, Result};
use crate::protocols::{scoreboard, wind, DeviceCodec, DeviceFamily, EdmReading, WindReading};
use crate::protocols::scoreboard::TagSequencer;
use crate::reliability;
use crate::transport::{probe_endpoint, SerialTransport, TcpTransport, Transport};

/// Connect timeout for network transports.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of one live connection, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub role: DeviceRole,
    pub protocol: String,
    pub endpoint: String,
    pub connected_at: DateTime<Utc>,
}

struct ActiveDevice {
    status: DeviceStatus,
    codec: DeviceCodec,
    read_timeout: Duration,
    transport: Box<dyn Transport>,
    tags: TagSequencer,
}

impl ActiveDevice {
    /// One poll/response exchange: send the codec's poll command, then
    /// accumulate bytes until the codec recognises a complete frame.
    async fn transaction(&mut self) -> Result<Vec<u8>> {
        let poll = self.codec.poll_command().ok_or_else(|| {
            FieldError::internal(format!(
                "Codec {:?} has no poll command",
                self.codec
            ))
        })?;
        self.transport.send(poll).await?;
        let codec = self.codec;
        self.transport
            .read_until(&move |buf: &[u8]| codec.frame_complete(buf), self.read_timeout)
            .await
    }
}

/// Registry of live device connections, keyed by role.
pub struct DeviceManager {
    devices: RwLock<HashMap<DeviceRole, Arc<Mutex<ActiveDevice>>>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Open the configured transport and register the device. Fails if the
    /// role is already occupied or the protocol does not match the role.
    pub async fn connect(&self, cfg: &DeviceConfig) -> Result<()> {
        let codec = DeviceCodec::from_protocol_id(&cfg.protocol)?;
        check_role_family(cfg.role, codec)?;

        let (transport, endpoint): (Box<dyn Transport>, String) = match &cfg.transport {
            TransportConfig::Network { host, port } => {
                let addr = format!("{host}:{port}");
                let tcp = TcpTransport::connect(&addr, CONNECT_TIMEOUT).await?;
                (Box::new(tcp), addr)
            },
            TransportConfig::Serial { path, baud } => {
                let serial = SerialTransport::open(path, *baud)?;
                (Box::new(serial), format!("{path}@{baud}"))
            },
        };

        self.register(cfg.role, &cfg.protocol, endpoint, codec, cfg.read_timeout(), transport)
            .await
    }

    /// Retry wrapper around [`connect`]: used at session start where a
    /// device may still be booting. Only retryable faults are retried.
    pub async fn connect_with_retry(
        &self,
        cfg: &DeviceConfig,
        attempts: u32,
        backoff: Duration,
    ) -> Result<()> {
        let mut last = FieldError::internal("connect_with_retry with zero attempts");
        for attempt in 1..=attempts.max(1) {
            match self.connect(cfg).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        role = %cfg.role,
                        attempt,
                        error = %e,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    last = e;
                },
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    /// Register an already-open transport. Test and demo entry point; the
    /// scoreboard handshake still runs.
    pub async fn connect_with(
        &self,
        role: DeviceRole,
        protocol: &str,
        transport: Box<dyn Transport>,
    ) -> Result<()> {
        let codec = DeviceCodec::from_protocol_id(protocol)?;
        check_role_family(role, codec)?;
        self.register(
            role,
            protocol,
            "injected".to_string(),
            codec,
            Duration::from_secs(2),
            transport,
        )
        .await
    }

    async fn register(
        &self,
        role: DeviceRole,
        protocol: &str,
        endpoint: String,
        codec: DeviceCodec,
        read_timeout: Duration,
        mut transport: Box<dyn Transport>,
    ) -> Result<()> {
        {
            let devices = self.devices.read().await;
            if devices.contains_key(&role) {
                return Err(FieldError::already_connected(role));
            }
        }

        if codec.family() == DeviceFamily::Scoreboard {
            handshake_scoreboard(transport.as_mut(), read_timeout).await?;
        }

        let device = ActiveDevice {
            status: DeviceStatus {
                role,
                protocol: protocol.to_string(),
                endpoint: endpoint.clone(),
                connected_at: Utc::now(),
            },
            codec,
            read_timeout,
            transport,
            tags: TagSequencer::new(),
        };

        let mut devices = self.devices.write().await;
        if devices.contains_key(&role) {
            return Err(FieldError::already_connected(role));
        }
        devices.insert(role, Arc::new(Mutex::new(device)));
        info!(role = %role, protocol, endpoint = %endpoint, "Device connected");
        Ok(())
    }

    /// Close and remove the device. Disconnecting an absent role is a no-op.
    pub async fn disconnect(&self, role: DeviceRole) -> Result<()> {
        let removed = self.devices.write().await.remove(&role);
        if let Some(device) = removed {
            device.lock().await.transport.close().await?;
            info!(role = %role, "Device disconnected");
        }
        Ok(())
    }

    pub async fn is_connected(&self, role: DeviceRole) -> bool {
        self.devices.read().await.contains_key(&role)
    }

    pub async fn status(&self) -> Vec<DeviceStatus> {
        let devices = self.devices.read().await;
        let mut out = Vec::with_capacity(devices.len());
        for device in devices.values() {
            out.push(device.lock().await.status.clone());
        }
        out.sort_by_key(|s| s.role);
        out
    }

    async fn device(&self, role: DeviceRole) -> Result<Arc<Mutex<ActiveDevice>>> {
        self.devices
            .read()
            .await
            .get(&role)
            .cloned()
            .ok_or_else(|| FieldError::not_connected(role))
    }

    /// Single rangefinder measurement.
    pub async fn read_edm(&self) -> Result<EdmReading> {
        let device = self.device(DeviceRole::Edm).await?;
        let mut device = device.lock().await;
        let frame = device.transaction().await?;
        crate::protocols::edm::decode_response(&frame)
    }

    /// Accepted rangefinder measurement: two reads spaced
    /// [`reliability::READ_SPACING`] apart, merged under the agreement
    /// tolerance. Holds the device lock across the pair so no other
    /// transaction interleaves.
    pub async fn reliable_edm_reading(&self) -> Result<EdmReading> {
        let device = self.device(DeviceRole::Edm).await?;
        let mut device = device.lock().await;

        let first = crate::protocols::edm::decode_response(&device.transaction().await?)?;
        tokio::time::sleep(reliability::READ_SPACING).await;
        let second = crate::protocols::edm::decode_response(&device.transaction().await?)?;

        reliability::merge_pair(&first, &second)
    }

    /// Single anemometer sample.
    pub async fn read_wind(&self) -> Result<WindReading> {
        let device = self.device(DeviceRole::Wind).await?;
        let mut device = device.lock().await;
        let codec = device.codec;
        let frame = device.transaction().await?;
        codec.decode_wind(&frame)
    }

    /// Averaged wind measurement over a sampling window: `samples` polls
    /// spaced `interval` apart, mean speed in m/s.
    pub async fn measure_wind(&self, samples: usize, interval: Duration) -> Result<f64> {
        if samples == 0 {
            return Err(FieldError::config("Wind sample count must be positive"));
        }
        let mut averager = wind::WindAverager::new(samples);
        for i in 0..samples {
            if i > 0 {
                tokio::time::sleep(interval).await;
            }
            averager.push(self.read_wind().await?.speed_mps);
        }
        averager
            .average()
            .ok_or_else(|| FieldError::internal("Wind window empty after sampling"))
    }

    /// Reachability diagnostic for a configured device. For network devices
    /// only a TCP connect is attempted and no bytes are exchanged; for
    /// serial devices the port is opened and released.
    pub async fn probe(&self, cfg: &DeviceConfig) -> Result<()> {
        match &cfg.transport {
            TransportConfig::Network { host, port } => {
                probe_endpoint(host, *port, CONNECT_TIMEOUT).await
            },
            TransportConfig::Serial { path, baud } => {
                let mut serial = SerialTransport::open(path, *baud)?;
                serial.close().await
            },
        }
    }

    /// Push a result to the scoreboard: the mark frame then the
    /// athlete/attempt frame, both under one tag.
    pub async fn show_mark(&self, mark: &str, bib: &str, attempt: u8) -> Result<()> {
        let device = self.device(DeviceRole::Scoreboard).await?;
        let mut device = device.lock().await;

        let address = 0x01;
        let tag = device.tags.next_tag();
        let mark_frame = scoreboard::encode_mark_frame(address, tag, mark)?;
        let athlete_frame = scoreboard::encode_athlete_frame(address, tag, bib, attempt)?;

        device.transport.send(&mark_frame).await?;
        device.transport.send(&athlete_frame).await?;
        info!(mark, bib, attempt, tag = format!("{tag:#04x}"), "Scoreboard updated");
        Ok(())
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn check_role_family(role: DeviceRole, codec: DeviceCodec) -> Result<()> {
    let expected = match role {
        DeviceRole::Edm => DeviceFamily::Edm,
        DeviceRole::Wind => DeviceFamily::Wind,
        DeviceRole::Scoreboard => DeviceFamily::Scoreboard,
    };
    if codec.family() != expected {
        return Err(FieldError::config(format!(
            "Protocol {codec:?} cannot serve the {role} role"
        )));
    }
    Ok(())
}

/// Scoreboard link check on connect: request byte out, ACK byte back.
async fn handshake_scoreboard(transport: &mut dyn Transport, timeout: Duration) -> Result<()> {
    transport.send(&[scoreboard::HANDSHAKE_REQUEST]).await?;
    let mut ack = [0u8; 1];
    let n = transport.receive(&mut ack, timeout).await?;
    if n != 1 || ack[0] != scoreboard::HANDSHAKE_ACK {
        return Err(FieldError::protocol(format!(
            "Scoreboard handshake failed: expected ACK {:#04x}, got {:?}",
            scoreboard::HANDSHAKE_ACK,
            &ack[..n]
        )));
    }
    Ok(())
}
