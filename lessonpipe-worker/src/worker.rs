//! Transcript worker
//!
//! Claims ready transcript artifacts with a lease, drives the exercise
//! engine, and advances each row's state machine. At most one worker holds
//! a live lease on a row; a lapsed lease is reclaimable with a fresh
//! attempt count. Successful completion happens exactly once because the
//! completion write is conditional on still owning the lease.

use crate::engine::{EngineContext, ExerciseEngine, MIN_TRANSCRIPT_CHARS};
use async_trait::async_trait;
use lessonpipe_common::config::WorkerConfig;
use lessonpipe_common::models::{TranscriptArtifact, TranscriptSource};
use lessonpipe_common::stores::AnalyticalStore;
use lessonpipe_common::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Optional collaborator that can pull a missing transcript from the
/// recording platform. The deployed topology has the external workflow
/// write transcripts directly, so this is usually absent.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(
        &self,
        artifact: &TranscriptArtifact,
    ) -> lessonpipe_common::Result<(String, TranscriptSource)>;
}

/// Per-tick accounting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTick {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct TranscriptWorker {
    store: Arc<dyn AnalyticalStore>,
    engine: ExerciseEngine,
    fetcher: Option<Arc<dyn TranscriptFetcher>>,
    config: WorkerConfig,
}

impl TranscriptWorker {
    pub fn new(
        store: Arc<dyn AnalyticalStore>,
        engine: ExerciseEngine,
        fetcher: Option<Arc<dyn TranscriptFetcher>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            fetcher,
            config,
        }
    }

    /// Poll until cancelled. No state survives between ticks; each tick
    /// re-derives its view from the store.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            lease_secs = self.config.lease_duration.as_secs(),
            "Transcript worker started"
        );

        loop {
            match self.tick(&cancel).await {
                Ok(stats) if stats.claimed > 0 => {
                    info!(
                        claimed = stats.claimed,
                        completed = stats.completed,
                        retried = stats.retried,
                        failed = stats.failed,
                        "Worker tick complete"
                    );
                }
                Ok(_) => debug!("No claimable transcript artifacts"),
                Err(e) => warn!(error = %e, "Worker tick failed, will retry next interval"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    info!("Transcript worker stopping");
                    return;
                }
            }
        }
    }

    /// One claim-and-process pass over at most `batch_size` rows.
    pub async fn tick(&self, cancel: &CancellationToken) -> lessonpipe_common::Result<WorkerTick> {
        let candidates = self
            .store
            .find_claimable(self.config.batch_size, self.config.lease_duration)
            .await?;
        let mut stats = WorkerTick::default();

        for candidate in candidates {
            if cancel.is_cancelled() {
                break;
            }

            let claimed = match self.store.try_claim(&candidate).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    debug!(
                        summary_id = candidate.summary_id,
                        "Lost claim race, moving on"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        summary_id = candidate.summary_id,
                        error = %e,
                        "Claim attempt failed"
                    );
                    continue;
                }
            };
            stats.claimed += 1;

            match self.process(claimed).await {
                RowOutcome::Completed => stats.completed += 1,
                RowOutcome::Retried => stats.retried += 1,
                RowOutcome::Failed => stats.failed += 1,
                RowOutcome::Abandoned => {}
            }
        }

        Ok(stats)
    }

    /// Drive one claimed row to completion, retry, or terminal failure.
    async fn process(&self, mut artifact: TranscriptArtifact) -> RowOutcome {
        let summary_id = artifact.summary_id;
        debug!(
            summary_id,
            attempt = artifact.processing_attempts,
            "Processing transcript artifact"
        );

        // Data-validity gate, with the optional fetch escape hatch.
        if !artifact.has_usable_transcript(MIN_TRANSCRIPT_CHARS) {
            match &self.fetcher {
                Some(fetcher) => match fetcher.fetch(&artifact).await {
                    Ok((transcript, source)) if transcript.trim().len() >= MIN_TRANSCRIPT_CHARS => {
                        if let Err(e) = self
                            .store
                            .store_transcript(summary_id, &transcript, source)
                            .await
                        {
                            return self.handle_store_error(summary_id, e).await;
                        }
                        // Continue under the same lease; re-claim semantics
                        // would double-count the attempt.
                        artifact.transcript = Some(transcript);
                        artifact.transcript_source = source;
                    }
                    Ok(_) => {
                        return self
                            .fail(summary_id, "fetched transcript missing or too short")
                            .await;
                    }
                    Err(e) => {
                        warn!(summary_id, error = %e, "Transcript fetch failed");
                        return self
                            .retry_or_fail(&artifact, &format!("transcript fetch failed: {e}"))
                            .await;
                    }
                },
                None => {
                    return self.fail(summary_id, "transcript missing or too short").await;
                }
            }
        }

        let transcript = artifact.transcript.clone().unwrap_or_default();
        let context = EngineContext {
            summary_id,
            user_id: artifact.user_id.clone(),
            teacher_id: artifact.teacher_id.clone(),
            class_id: artifact.class_id.clone(),
            meeting_date: artifact.meeting_date.clone(),
        };

        // Soft deadline on the engine; a timed-out row goes back to the
        // queue with its attempt already counted by the claim.
        let document = match tokio::time::timeout(
            self.config.engine_deadline,
            self.engine.generate(&transcript, &context),
        )
        .await
        {
            Ok(document) => document,
            Err(_) => {
                warn!(summary_id, "Exercise engine exceeded its deadline");
                return self
                    .retry_or_fail(&artifact, "exercise generation deadline exceeded")
                    .await;
            }
        };

        match self.store.complete_with_exercises(summary_id, document).await {
            Ok(set) => {
                info!(
                    summary_id,
                    exercises_id = set.exercises_id,
                    "Transcript artifact completed"
                );
                RowOutcome::Completed
            }
            Err(e) => self.handle_store_error(summary_id, e).await,
        }
    }

    /// A store error during a mutation we thought we were entitled to.
    /// Invariant violations abandon the unit of work; anything else is a
    /// transient fault handled by the retry policy on a later lease.
    async fn handle_store_error(&self, summary_id: i64, error: Error) -> RowOutcome {
        match error {
            Error::InvariantViolation(reason) => {
                warn!(summary_id, reason = %reason, "Abandoning unit of work");
                RowOutcome::Abandoned
            }
            other => {
                warn!(
                    summary_id,
                    error = %other,
                    "Store write failed; lease will lapse and the row will be reclaimed"
                );
                RowOutcome::Abandoned
            }
        }
    }

    async fn retry_or_fail(&self, artifact: &TranscriptArtifact, reason: &str) -> RowOutcome {
        if artifact.processing_attempts < self.config.max_retries {
            match self
                .store
                .release_for_retry(artifact.summary_id, reason)
                .await
            {
                Ok(()) => RowOutcome::Retried,
                Err(e) => self.handle_store_error(artifact.summary_id, e).await,
            }
        } else {
            self.fail(artifact.summary_id, reason).await
        }
    }

    async fn fail(&self, summary_id: i64, reason: &str) -> RowOutcome {
        warn!(summary_id, reason = %reason, "Marking transcript artifact failed");
        match self.store.mark_failed(summary_id, reason).await {
            Ok(()) => RowOutcome::Failed,
            Err(e) => self.handle_store_error(summary_id, e).await,
        }
    }
}

enum RowOutcome {
    Completed,
    Retried,
    Failed,
    Abandoned,
}
