//! Class monitor
//!
//! Polls the operational store for ended classes and dispatches each
//! exactly once to the external workflow. The conditional update on
//! `ai_triggered` is the authority: selection is advisory, and any number
//! of monitor instances can run concurrently.

use lessonpipe_common::config::MonitorConfig;
use lessonpipe_common::dispatch::{DispatchOutcome, Dispatcher, WebhookPayload};
use lessonpipe_common::stores::operational;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-tick accounting, mostly for logs and tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTick {
    pub examined: usize,
    pub dispatched: usize,
    pub retryable: usize,
    pub permanent: usize,
}

pub struct ClassMonitor {
    pool: SqlitePool,
    dispatcher: Arc<dyn Dispatcher>,
    config: MonitorConfig,
}

impl ClassMonitor {
    pub fn new(pool: SqlitePool, dispatcher: Arc<dyn Dispatcher>, config: MonitorConfig) -> Self {
        Self {
            pool,
            dispatcher,
            config,
        }
    }

    /// Poll until cancelled. Per-class faults never abort the loop; a tick
    /// that fails outright is logged and retried at the next interval.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Class monitor started"
        );

        loop {
            match self.tick(&cancel).await {
                Ok(stats) if stats.examined > 0 => {
                    info!(
                        examined = stats.examined,
                        dispatched = stats.dispatched,
                        retryable = stats.retryable,
                        permanent = stats.permanent,
                        "Monitor tick complete"
                    );
                }
                Ok(_) => debug!("No ended classes to dispatch"),
                Err(e) => warn!(error = %e, "Monitor tick failed, will retry next interval"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    info!("Class monitor stopping");
                    return;
                }
            }
        }
    }

    /// One snapshot-and-dispatch pass.
    pub async fn tick(&self, cancel: &CancellationToken) -> lessonpipe_common::Result<MonitorTick> {
        let classes =
            operational::fetch_ended_classes(&self.pool, self.config.batch_size).await?;
        let mut stats = MonitorTick {
            examined: classes.len(),
            ..Default::default()
        };

        for class in &classes {
            if cancel.is_cancelled() {
                break;
            }

            let payload = WebhookPayload::from_class(class);
            // Stable across retries so the external side can deduplicate
            let idempotency_key = class.class_id.clone();

            match self.dispatcher.dispatch(&payload, &idempotency_key).await {
                DispatchOutcome::Success => {
                    match operational::mark_class_triggered(&self.pool, &class.class_id).await {
                        Ok(true) => {
                            stats.dispatched += 1;
                            info!(class_id = %class.class_id, "Class dispatched and marked");
                        }
                        Ok(false) => {
                            // Another instance won the flag; the duplicate
                            // dispatch is tolerated downstream via the
                            // idempotency key.
                            debug!(
                                class_id = %class.class_id,
                                "Flag already set by a concurrent monitor"
                            );
                        }
                        Err(e) => {
                            warn!(
                                class_id = %class.class_id,
                                error = %e,
                                "Dispatched but failed to set flag; row will be re-examined"
                            );
                        }
                    }
                }
                DispatchOutcome::Retryable(reason) => {
                    stats.retryable += 1;
                    warn!(
                        class_id = %class.class_id,
                        reason = %reason,
                        "Webhook dispatch failed transiently, retrying next tick"
                    );
                }
                DispatchOutcome::Permanent(reason) => {
                    stats.permanent += 1;
                    error!(
                        class_id = %class.class_id,
                        reason = %reason,
                        payload_digest = %payload_digest(&payload),
                        "Webhook rejected dispatch; needs upstream intervention"
                    );
                }
            }
        }

        Ok(stats)
    }
}

/// Short digest for logging rejected payloads without leaking their content
fn payload_digest(payload: &WebhookPayload) -> String {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    let hash = Sha256::digest(&body);
    format!("{:x}", hash)[..16].to_string()
}
