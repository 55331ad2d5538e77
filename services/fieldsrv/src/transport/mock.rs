//! Scripted transport for unit tests
//!
//! Plays back a queue of canned responses and records everything written,
//! so codec and engine tests never need real hardware or sockets.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use super::Transport;
use crate::error::{FieldError, Result};

/// In-memory transport with scripted responses.
#[derive(Debug)]
pub struct MockTransport {
    responses: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    open: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            sent: Vec::new(),
            open: true,
        }
    }

    /// Queue one response; each `receive` call drains one queued entry.
    pub fn push_response(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.responses.push_back(bytes.into());
        self
    }

    pub fn with_responses<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let mut mock = Self::new();
        for response in responses {
            mock.push_response(response);
        }
        mock
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(FieldError::connection("Mock transport is closed"));
        }
        self.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.open {
            return Err(FieldError::connection("Mock transport is closed"));
        }
        match self.responses.pop_front() {
            Some(response) => {
                let n = response.len().min(buf.len());
                buf[..n].copy_from_slice(&response[..n]);
                // Anything that did not fit stays queued for the next read
                if n < response.len() {
                    self.responses.push_front(response[n..].to_vec());
                }
                Ok(n)
            },
            None => Err(FieldError::timeout(format!(
                "Mock has no queued response (would wait {} ms)",
                timeout.as_millis()
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }
}
