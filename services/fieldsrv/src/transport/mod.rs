//! Byte-level duplex channels to measurement hardware
//!
//! A [`Transport`] is a connected serial or TCP link with explicit per-call
//! timeouts. Every read is bounded: a device that never terminates its
//! response surfaces as a `TimeoutError`, never an infinite block. The
//! protocol layer above decides when an accumulated buffer is a complete
//! frame via `read_until`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{FieldError, Result};

mod mock;
mod serial;
mod tcp;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Duplex byte channel with bounded reads.
#[async_trait]
pub trait Transport: Send {
    /// Write all bytes and flush.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read at most `buf.len()` bytes, waiting up to `timeout`.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the channel. Idempotent.
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Accumulate bytes until `is_complete` accepts the buffer, under a
    /// single overall deadline. Returns `TimeoutError` if the frame never
    /// completes within `timeout`.
    async fn read_until(
        &mut self,
        is_complete: &(dyn for<'a> Fn(&'a [u8]) -> bool + Sync),
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut collected = Vec::with_capacity(64);
        let mut chunk = [0u8; 256];

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(FieldError::timeout(format!(
                    "Response incomplete after {} ms ({} bytes buffered)",
                    timeout.as_millis(),
                    collected.len()
                )));
            }

            let n = self.receive(&mut chunk, remaining).await?;
            collected.extend_from_slice(&chunk[..n]);

            if is_complete(&collected) {
                return Ok(collected);
            }
        }
    }
}

/// Connect-only reachability probe for diagnostics.
///
/// Distinct from the data connection: no bytes are exchanged and the socket
/// is dropped immediately. Used by operators to distinguish "device off /
/// unplugged" from protocol faults.
pub async fn probe_endpoint(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let addr = format!("{host}:{port}");
    debug!(addr = %addr, timeout_ms = timeout.as_millis(), "Probing endpoint");

    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(FieldError::connection(format!(
            "Probe of {addr} failed: {e}"
        ))),
        Err(_) => Err(FieldError::timeout(format!(
            "Probe of {addr} timed out after {} ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn read_until_assembles_split_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Server dribbles a CRLF-terminated line in three writes
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for part in [&b"+2."[..], &b"3"[..], &b"\r\n"[..]] {
                stream.write_all(part).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let mut transport = TcpTransport::connect(&addr, Duration::from_secs(2))
            .await
            .unwrap();
        let frame = transport
            .read_until(&|buf: &[u8]| buf.ends_with(b"\r\n"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(frame, b"+2.3\r\n");

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_until_times_out_without_terminator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Server sends a partial frame and then goes quiet
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"+2.3").await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr, Duration::from_secs(2))
            .await
            .unwrap();
        let result = transport
            .read_until(
                &|buf: &[u8]| buf.ends_with(b"\r\n"),
                Duration::from_millis(150),
            )
            .await;
        assert!(matches!(result, Err(FieldError::TimeoutError(_))));

        server.abort();
    }

    #[tokio::test]
    async fn probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        probe_endpoint(
            &addr.ip().to_string(),
            addr.port(),
            Duration::from_secs(3),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn probe_fails_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe_endpoint(
            &addr.ip().to_string(),
            addr.port(),
            Duration::from_secs(3),
        )
        .await;
        assert!(matches!(result, Err(FieldError::ConnectionError(_))));
    }
}
