//! TCP transport for network-attached devices
//!
//! Wind gauges and scoreboards on the field network usually sit behind a
//! serial-to-ethernet converter, so the wire contract is identical to the
//! serial case: small request, small delimited response.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use super::Transport;
use crate::error::{FieldError, Result};

/// TCP transport. The stream is `None` once closed.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    addr: String,
}

impl TcpTransport {
    /// Connect to `host:port` within `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        debug!(addr = %addr, timeout_ms = timeout.as_millis(), "Connecting to TCP device");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                FieldError::timeout(format!(
                    "TCP connect to {addr} timed out after {} ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| FieldError::connection(format!("TCP connect to {addr} failed: {e}")))?;

        // Measurement commands are tiny and latency-sensitive
        if let Err(e) = stream.set_nodelay(true) {
            warn!(addr = %addr, error = %e, "Failed to set TCP_NODELAY, continuing");
        }

        debug!(addr = %addr, "TCP device connection established");
        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FieldError::connection("TCP transport is closed"))?;

        trace!(addr = %self.addr, bytes = data.len(), data = ?data, "TCP send");

        stream
            .write_all(data)
            .await
            .map_err(|e| FieldError::io(format!("TCP send to {} failed: {e}", self.addr)))?;
        stream
            .flush()
            .await
            .map_err(|e| FieldError::io(format!("TCP flush to {} failed: {e}", self.addr)))?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let addr = self.addr.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FieldError::connection("TCP transport is closed"))?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            // 0 bytes on TCP means the peer closed the connection
            Ok(Ok(0)) => Err(FieldError::connection(format!(
                "Peer {addr} closed the connection"
            ))),
            Ok(Ok(n)) => {
                trace!(addr = %addr, bytes = n, data = ?&buf[..n], "TCP receive");
                Ok(n)
            },
            Ok(Err(e)) => Err(FieldError::io(format!("TCP receive from {addr} failed: {e}"))),
            Err(_) => Err(FieldError::timeout(format!(
                "No data from {addr} within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!(addr = %self.addr, "Closing TCP device connection");
            if let Err(e) = stream.shutdown().await {
                warn!(addr = %self.addr, error = %e, "TCP shutdown failed, continuing");
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
