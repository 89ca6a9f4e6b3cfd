//! Single-part upload with bounded retry.

use std::sync::Arc;

use blobsend_protocol::UploadEvent;
use blobsend_store::{ObjectStore, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::UploadConfig;

/// Why a part could not be uploaded.
#[derive(Debug)]
pub(crate) enum PartFailure {
    /// The last attempt failed and no more were allowed.
    Exhausted { attempts: u32, error: StoreError },
    /// Cancelled while waiting to retry.
    Cancelled { attempts: u32 },
}

/// Uploads parts of one session, retrying with linear backoff.
///
/// Owns everything it needs so it can run on a spawned task.
#[derive(Clone)]
pub(crate) struct PartWorker {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub key: String,
    pub session_id: String,
    /// Retry budget and backoff.
    pub config: UploadConfig,
    pub events: Option<mpsc::Sender<UploadEvent>>,
    pub cancel: CancellationToken,
}

impl PartWorker {
    /// Sends `data` as `part_number`, making at most `1 + max_retries` attempts.
    ///
    /// Only retryable store errors are retried. An attempt already sent
    /// always runs to completion; cancellation only cuts the backoff wait.
    pub async fn upload(&self, part_number: u32, data: Vec<u8>) -> Result<String, PartFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .store
                .upload_part(&self.bucket, &self.key, &self.session_id, part_number, data.clone())
                .await;

            let error = match result {
                Ok(token) => {
                    debug!(session_id = %self.session_id, part_number, attempt, "part acknowledged");
                    return Ok(token);
                }
                Err(e) => e,
            };

            if !error.is_retryable() || attempt > self.config.max_retries {
                warn!(
                    session_id = %self.session_id,
                    part_number,
                    attempt,
                    error = %error,
                    "part failed, giving up"
                );
                return Err(PartFailure::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.config.retry_delay(attempt);
            warn!(
                session_id = %self.session_id,
                part_number,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "part failed, retrying"
            );
            if let Some(tx) = &self.events {
                let _ = tx
                    .send(UploadEvent::PartRetrying {
                        part_number,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: error.to_string(),
                    })
                    .await;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(PartFailure::Cancelled { attempts: attempt });
                }
            }
        }
    }
}
