//! Background job: record completed withdrawals with the backend.
//!
//! The on-chain transfer has already succeeded when a job is queued, so
//! recording is best-effort: the caller never waits on it and never sees it
//! fail. Failures are retried a bounded number of times with exponential
//! backoff and then kept in [`RecorderStatus::failed`] for the UI to show.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::errors::ClientError;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_ms: u64,
    /// Most recent final failures kept in [`RecorderStatus::failed`].
    pub max_failed_kept: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter_ms: 250,
            max_failed_kept: 100,
        }
    }
}

impl RecorderConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.record_max_retries,
            base_backoff: Duration::from_millis(cfg.record_backoff_ms),
            ..Self::default()
        }
    }

    /// `base * 2^(attempt - 1)`, capped, plus jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base_backoff.saturating_mul(1 << exp);
        let capped = raw.min(self.max_backoff);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub tx_hash: String,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Observable state of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub pending: usize,
    pub recorded: u64,
    /// Oldest first, capped at `max_failed_kept`.
    pub failed: Vec<FailedRecord>,
    /// Every final failure, including ones no longer in `failed`.
    pub failed_total: u64,
}

impl RecorderStatus {
    pub fn has_failures(&self) -> bool {
        self.failed_total > 0
    }

    fn push_failure(&mut self, record: FailedRecord, keep: usize) {
        self.failed_total += 1;
        self.failed.push(record);
        if self.failed.len() > keep {
            let excess = self.failed.len() - keep;
            self.failed.drain(..excess);
        }
    }
}

#[derive(Debug)]
struct RecordJob {
    tx_hash: String,
    delivery_id: Uuid,
}

pub struct WithdrawalRecorder {
    tx: mpsc::UnboundedSender<RecordJob>,
    status: Arc<watch::Sender<RecorderStatus>>,
    worker: JoinHandle<()>,
    keep_failed: usize,
}

/// Spawn the recorder worker. Jobs are processed one at a time, in order.
pub fn spawn(client: Arc<BackendClient>, config: RecorderConfig) -> WithdrawalRecorder {
    let (tx, mut rx) = mpsc::unbounded_channel::<RecordJob>();
    let (status, _) = watch::channel(RecorderStatus::default());
    let status = Arc::new(status);

    let worker_status = Arc::clone(&status);
    let keep = config.max_failed_kept;
    let worker = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let outcome = deliver(&client, &job, &config).await;
            worker_status.send_modify(|s| {
                s.pending = s.pending.saturating_sub(1);
                match outcome {
                    Ok(_) => s.recorded += 1,
                    Err((error, attempts)) => s.push_failure(
                        FailedRecord {
                            tx_hash: job.tx_hash.clone(),
                            error: error.to_string(),
                            attempts,
                            failed_at: Utc::now(),
                        },
                        keep,
                    ),
                }
            });
        }
    });

    WithdrawalRecorder {
        tx,
        status,
        worker,
        keep_failed: keep,
    }
}

impl WithdrawalRecorder {
    /// Queue a withdrawal for recording. Never blocks, never fails the caller.
    pub fn enqueue(&self, tx_hash: impl Into<String>) {
        let job = RecordJob {
            tx_hash: tx_hash.into(),
            delivery_id: Uuid::new_v4(),
        };
        self.status.send_modify(|s| s.pending += 1);

        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            warn!(tx_hash = %job.tx_hash, "withdrawal recorder stopped; record dropped");
            self.status.send_modify(|s| {
                s.pending = s.pending.saturating_sub(1);
                s.push_failure(
                    FailedRecord {
                        tx_hash: job.tx_hash,
                        error: "recorder stopped".to_string(),
                        attempts: 0,
                        failed_at: Utc::now(),
                    },
                    self.keep_failed,
                );
            });
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    /// Stop accepting jobs, finish the queued ones, and return the final status.
    pub async fn shutdown(self) -> RecorderStatus {
        let WithdrawalRecorder {
            tx, status, worker, ..
        } = self;
        drop(tx);
        if let Err(e) = worker.await {
            warn!(error = %e, "withdrawal recorder worker panicked");
        }
        let final_status = status.borrow().clone();
        final_status
    }
}

async fn deliver(
    client: &BackendClient,
    job: &RecordJob,
    config: &RecorderConfig,
) -> Result<u32, (ClientError, u32)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.record_withdrawal(&job.tx_hash).await {
            Ok(_) => {
                info!(
                    tx_hash = %job.tx_hash,
                    delivery_id = %job.delivery_id,
                    attempt,
                    "withdrawal recorded"
                );
                return Ok(attempt);
            }
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                let wait = config.backoff(attempt);
                warn!(
                    tx_hash = %job.tx_hash,
                    delivery_id = %job.delivery_id,
                    attempt,
                    error = %e,
                    retry_in_ms = wait.as_millis() as u64,
                    "withdrawal record failed, will retry"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                warn!(
                    tx_hash = %job.tx_hash,
                    delivery_id = %job.delivery_id,
                    attempt,
                    error = %e,
                    "withdrawal record failed; giving up"
                );
                return Err((e, attempt));
            }
        }
    }
}
