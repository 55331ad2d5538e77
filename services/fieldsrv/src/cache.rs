//! Durable result submission cache
//!
//! Results go to the competition server over HTTP. Any submission failure
//! parks the payload in an on-disk FIFO queue (one JSON object per line);
//! a background task retries the queue on a fixed period until the server
//! acknowledges each entry. The queue file is rewritten on every mutation
//! so an abrupt process exit never loses an accepted result.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FieldError, Result};

/// One attempt within a submitted series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesEntry {
    pub attempt: u8,
    /// Formatted mark, e.g. "21.34".
    pub mark: String,
    /// Unit of the mark, normally "m".
    pub unit: String,
    /// Wind reading in m/s where the event records one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<f64>,
    pub valid: bool,
}

/// Wire payload for `POST /api/v1/results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub event_id: String,
    pub athlete_bib: String,
    pub series: Vec<SeriesEntry>,
}

/// Queue entry: the payload plus when it was parked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    #[serde(flatten)]
    pub payload: ResultPayload,
    pub enqueued_at: DateTime<Utc>,
}

/// Durable FIFO of unacknowledged results.
pub struct ResultCache {
    endpoint: String,
    path: PathBuf,
    client: reqwest::Client,
    queue: Mutex<VecDeque<CachedResult>>,
}

impl ResultCache {
    /// Open the cache, reloading any entries a previous process left behind.
    pub fn open(endpoint: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let queue = load_queue(&path)?;
        if !queue.is_empty() {
            info!(pending = queue.len(), path = %path.display(), "Reloaded unacknowledged results");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FieldError::internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            path,
            client,
            queue: Mutex::new(queue),
        })
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Submit a result. A failed submission is parked in the queue and is
    /// not an error for the caller; only a cache persistence fault is.
    pub async fn post_result(&self, payload: ResultPayload) -> Result<()> {
        match self.submit(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, event_id = %payload.event_id, "Submission failed, queueing result");
                let entry = CachedResult {
                    payload,
                    enqueued_at: Utc::now(),
                };
                let mut queue = self.queue.lock().await;
                queue.push_back(entry);
                persist_queue(&self.path, &queue)
            },
        }
    }

    /// Retry queued entries in order. Stops at the first failure so FIFO
    /// order is preserved. Returns how many entries were acknowledged.
    pub async fn flush_pending(&self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            let front = {
                let queue = self.queue.lock().await;
                match queue.front() {
                    Some(entry) => entry.clone(),
                    None => break,
                }
            };

            if let Err(e) = self.submit(&front.payload).await {
                debug!(error = %e, "Queued result still undeliverable");
                break;
            }

            let mut queue = self.queue.lock().await;
            queue.pop_front();
            persist_queue(&self.path, &queue)?;
            delivered += 1;
            info!(event_id = %front.payload.event_id, remaining = queue.len(), "Queued result acknowledged");
        }
        Ok(delivered)
    }

    /// Background retry loop on a fixed period.
    pub fn spawn_flush_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so the period starts now
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.flush_pending().await {
                    Ok(0) => {},
                    Ok(n) => debug!(delivered = n, "Cache flush pass complete"),
                    Err(e) => warn!(error = %e, "Cache flush pass failed"),
                }
            }
        })
    }

    async fn submit(&self, payload: &ResultPayload) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| FieldError::connection(format!("Result submission failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(FieldError::connection(format!(
                "Result submission rejected: HTTP {}",
                response.status()
            )))
        }
    }
}

fn load_queue(path: &Path) -> Result<VecDeque<CachedResult>> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| FieldError::storage(format!("Cannot read {}: {e}", path.display())))?;
    let mut queue = VecDeque::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: CachedResult = serde_json::from_str(line).map_err(|e| {
            FieldError::storage(format!(
                "Corrupt cache entry at {}:{}: {e}",
                path.display(),
                idx + 1
            ))
        })?;
        queue.push_back(entry);
    }
    Ok(queue)
}

/// Rewrite the whole queue file. Written to a sibling temp file first and
/// renamed over the target so a crash mid-write never truncates the queue.
fn persist_queue(path: &Path, queue: &VecDeque<CachedResult>) -> Result<()> {
    let mut out = String::new();
    for entry in queue {
        let line = serde_json::to_string(entry)
            .map_err(|e| FieldError::storage(format!("Cache entry serialization failed: {e}")))?;
        out.push_str(&line);
        out.push('\n');
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, out)
        .map_err(|e| FieldError::storage(format!("Cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| FieldError::storage(format!("Cannot replace {}: {e}", path.display())))?;
    Ok(())
}
