//! In-memory analytical store
//!
//! A linearizable implementation of [`AnalyticalStore`] backed by a single
//! mutex, used by the test suites and by local development without a row
//! store. Claim semantics are identical to the REST implementation: every
//! mutation re-checks the row's current state under the lock, so concurrent
//! workers racing for one candidate see exactly one winner.

use crate::models::{
    ExerciseDocument, ExerciseSet, ExerciseSetStatus, NewTranscriptArtifact, SummaryStatus,
    TranscriptArtifact, TranscriptSource,
};
use crate::stores::analytical::{AnalyticalStore, InsertOutcome};
use crate::{time, Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A worker still owns its claim while the row is `processing`, or while
/// the row sits in `awaiting_exercises` with the lease stamp intact (the
/// transcript-fetch path stores the transcript mid-lease).
fn owns_lease(row: &TranscriptArtifact) -> bool {
    row.status == SummaryStatus::Processing
        || (row.status == SummaryStatus::AwaitingExercises && row.claimed_at.is_some())
}

#[derive(Default)]
struct Inner {
    summaries: BTreeMap<i64, TranscriptArtifact>,
    exercise_sets: BTreeMap<i64, ExerciseSet>,
    next_summary_id: i64,
    next_exercises_id: i64,
}

/// See module docs. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryAnalyticalStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAnalyticalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding helper: place a fully-formed artifact row, assigning the
    /// next summary id. Mirrors what the external workflow does when it
    /// writes transcripts directly.
    pub async fn seed_summary(
        &self,
        new: NewTranscriptArtifact,
        transcript: Option<String>,
        status: SummaryStatus,
    ) -> TranscriptArtifact {
        let mut inner = self.inner.lock().await;
        let artifact = materialize(&mut inner, new);
        let id = artifact.summary_id;
        let row = inner.summaries.get_mut(&id).unwrap();
        row.transcript_length = transcript.as_deref().map(|t| t.len() as i64).unwrap_or(0);
        row.transcript = transcript;
        row.status = status;
        row.clone()
    }

    /// Test helper: external reset of a failed row back to `pending`.
    pub async fn reset_failed(&self, summary_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .summaries
            .get_mut(&summary_id)
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        if row.status != SummaryStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "summary {summary_id} is {}, not failed",
                row.status.as_str()
            )));
        }
        row.status = SummaryStatus::Pending;
        row.processing_attempts = 0;
        row.last_error = None;
        row.claimed_at = None;
        row.updated_at = time::now();
        Ok(())
    }

    /// Test helper: rewind a lease stamp so it reads as lapsed.
    pub async fn age_claim(&self, summary_id: i64, by: Duration) {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.summaries.get_mut(&summary_id) {
            if let Some(claimed) = row.claimed_at {
                row.claimed_at = Some(claimed - chrono::Duration::from_std(by).unwrap());
            }
        }
    }

    /// Test helper: raw row access.
    pub async fn summary(&self, summary_id: i64) -> Option<TranscriptArtifact> {
        self.inner.lock().await.summaries.get(&summary_id).cloned()
    }

    /// Test helper: all exercise sets, insertion order.
    pub async fn all_exercise_sets(&self) -> Vec<ExerciseSet> {
        self.inner.lock().await.exercise_sets.values().cloned().collect()
    }
}

fn materialize(inner: &mut Inner, new: NewTranscriptArtifact) -> TranscriptArtifact {
    inner.next_summary_id += 1;
    let now = time::now();
    let artifact = TranscriptArtifact {
        summary_id: inner.next_summary_id,
        user_id: new.user_id,
        teacher_id: new.teacher_id,
        class_id: new.class_id,
        teacher_email: new.teacher_email,
        meeting_date: new.meeting_date,
        start_time: new.start_time,
        end_time: new.end_time,
        transcript: None,
        transcript_length: 0,
        transcript_source: TranscriptSource::Unknown,
        status: SummaryStatus::Pending,
        processing_attempts: 0,
        last_error: None,
        claimed_at: None,
        processed_at: None,
        created_at: now,
        updated_at: now,
    };
    inner.summaries.insert(artifact.summary_id, artifact.clone());
    artifact
}

#[async_trait]
impl AnalyticalStore for MemoryAnalyticalStore {
    async fn health_check(&self) -> bool {
        true
    }

    async fn insert_summary(&self, new: NewTranscriptArtifact) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .summaries
            .values()
            .find(|s| {
                s.class_id == new.class_id
                    && s.meeting_date == new.meeting_date
                    && s.start_time == new.start_time
            })
            .cloned();
        if let Some(existing) = existing {
            return Ok(InsertOutcome::Exists(existing));
        }
        Ok(InsertOutcome::Created(materialize(&mut inner, new)))
    }

    async fn get_summary(&self, summary_id: i64) -> Result<Option<TranscriptArtifact>> {
        Ok(self.inner.lock().await.summaries.get(&summary_id).cloned())
    }

    async fn find_claimable(
        &self,
        limit: u32,
        lease_duration: Duration,
    ) -> Result<Vec<TranscriptArtifact>> {
        let inner = self.inner.lock().await;
        let lease = chrono::Duration::from_std(lease_duration)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let cutoff = time::now() - lease;
        let mut candidates: Vec<_> = inner
            .summaries
            .values()
            .filter(|s| {
                s.status.is_claimable()
                    && s.claimed_at.map(|c| c < cutoff).unwrap_or(true)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|s| s.created_at);
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn try_claim(
        &self,
        candidate: &TranscriptArtifact,
    ) -> Result<Option<TranscriptArtifact>> {
        let mut inner = self.inner.lock().await;
        let row = match inner.summaries.get_mut(&candidate.summary_id) {
            Some(row) => row,
            None => return Ok(None),
        };
        // CAS predicate: the row still looks exactly as the candidate did.
        if row.status != candidate.status || row.claimed_at != candidate.claimed_at {
            return Ok(None);
        }
        row.status = SummaryStatus::Processing;
        row.claimed_at = Some(time::now());
        row.processing_attempts += 1;
        row.updated_at = time::now();
        Ok(Some(row.clone()))
    }

    async fn store_transcript(
        &self,
        summary_id: i64,
        transcript: &str,
        source: TranscriptSource,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .summaries
            .get_mut(&summary_id)
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        if row.status != SummaryStatus::Processing {
            return Err(Error::InvariantViolation(format!(
                "summary {summary_id} is {}, expected processing",
                row.status.as_str()
            )));
        }
        row.transcript = Some(transcript.to_string());
        row.transcript_length = transcript.len() as i64;
        row.transcript_source = source;
        row.status = SummaryStatus::AwaitingExercises;
        row.updated_at = time::now();
        Ok(())
    }

    async fn release_for_retry(&self, summary_id: i64, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .summaries
            .get_mut(&summary_id)
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        if !owns_lease(row) {
            return Err(Error::InvariantViolation(format!(
                "summary {summary_id} is {} without a lease",
                row.status.as_str()
            )));
        }
        row.status = SummaryStatus::AwaitingExercises;
        row.last_error = Some(error.to_string());
        row.claimed_at = None;
        row.updated_at = time::now();
        Ok(())
    }

    async fn mark_failed(&self, summary_id: i64, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .summaries
            .get_mut(&summary_id)
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        if !owns_lease(row) {
            return Err(Error::InvariantViolation(format!(
                "summary {summary_id} is {} without a lease",
                row.status.as_str()
            )));
        }
        row.status = SummaryStatus::Failed;
        row.last_error = Some(error.to_string());
        row.claimed_at = None;
        row.updated_at = time::now();
        Ok(())
    }

    async fn complete_with_exercises(
        &self,
        summary_id: i64,
        document: ExerciseDocument,
    ) -> Result<ExerciseSet> {
        let mut inner = self.inner.lock().await;
        let summary = inner
            .summaries
            .get(&summary_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        if !owns_lease(&summary) {
            return Err(Error::InvariantViolation(format!(
                "summary {summary_id} is {} without a lease",
                summary.status.as_str()
            )));
        }

        // Supersede any previously active set so at most one non-rejected
        // set exists per summary.
        for set in inner.exercise_sets.values_mut() {
            if set.summary_id == summary_id && set.status != ExerciseSetStatus::Rejected {
                set.status = ExerciseSetStatus::Rejected;
            }
        }

        inner.next_exercises_id += 1;
        let set = ExerciseSet {
            exercises_id: inner.next_exercises_id,
            summary_id,
            user_id: summary.user_id.clone(),
            teacher_id: summary.teacher_id.clone(),
            class_id: summary.class_id.clone(),
            generated_at: time::now(),
            exercises: document,
            status: ExerciseSetStatus::PendingApproval,
        };
        inner.exercise_sets.insert(set.exercises_id, set.clone());

        let row = inner.summaries.get_mut(&summary_id).unwrap();
        row.status = SummaryStatus::Completed;
        row.processed_at = Some(time::now());
        row.claimed_at = None;
        row.updated_at = time::now();

        Ok(set)
    }

    async fn exercise_set_for(&self, summary_id: i64) -> Result<Option<ExerciseSet>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .exercise_sets
            .values()
            .filter(|s| s.summary_id == summary_id && s.status != ExerciseSetStatus::Rejected)
            .max_by_key(|s| s.generated_at)
            .cloned())
    }

    async fn list_exercise_sets(
        &self,
        class_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ExerciseSet>> {
        let inner = self.inner.lock().await;
        let mut sets: Vec<_> = inner
            .exercise_sets
            .values()
            .filter(|s| s.class_id == class_id)
            .filter(|s| user_id.map(|u| s.user_id == u).unwrap_or(true))
            .cloned()
            .collect();
        sets.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(sets)
    }
}
