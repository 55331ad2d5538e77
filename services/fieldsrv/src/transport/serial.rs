//! Serial transport for directly-cabled devices
//!
//! EDM rangefinders run 9600-8-N-1; scoreboard controllers run 19200-8-N-1.
//! The framing is fixed at 8-N-1 for the whole device family, only the baud
//! rate differs per role.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace};

use super::Transport;
use crate::error::{FieldError, Result};

/// Serial transport over a tokio-serial stream. `None` once closed.
pub struct SerialTransport {
    stream: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open a serial device at the given baud rate, 8-N-1.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        debug!(path = %path, baud = baud, "Opening serial device");

        let stream = tokio_serial::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| {
                FieldError::connection(format!("Failed to open serial port {path}: {e}"))
            })?;

        Ok(Self {
            stream: Some(stream),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FieldError::connection("Serial transport is closed"))?;

        trace!(path = %self.path, bytes = data.len(), data = ?data, "Serial send");

        stream
            .write_all(data)
            .await
            .map_err(|e| FieldError::io(format!("Serial write to {} failed: {e}", self.path)))?;
        stream
            .flush()
            .await
            .map_err(|e| FieldError::io(format!("Serial flush to {} failed: {e}", self.path)))?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let path = self.path.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FieldError::connection("Serial transport is closed"))?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(n)) => {
                trace!(path = %path, bytes = n, data = ?&buf[..n], "Serial receive");
                Ok(n)
            },
            Ok(Err(e)) => Err(FieldError::io(format!(
                "Serial read from {path} failed: {e}"
            ))),
            Err(_) => Err(FieldError::timeout(format!(
                "No data from {path} within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!(path = %self.path, "Closed serial device");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
