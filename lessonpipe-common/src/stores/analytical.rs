//! Analytical store gateway trait
//!
//! The transcript worker and the HTTP surface talk to the analytical row
//! store exclusively through this trait. The production implementation is
//! [`super::RestAnalyticalStore`]; tests and local development use
//! [`super::MemoryAnalyticalStore`].
//!
//! All mutations are conditional updates. A method that returns
//! `Error::InvariantViolation` means the caller's view of the row was stale
//! (its lease lapsed or another worker won a race); the caller must abandon
//! the current unit of work and re-derive its view on the next tick.

use crate::models::{
    ExerciseDocument, ExerciseSet, NewTranscriptArtifact, TranscriptArtifact, TranscriptSource,
};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Result of an idempotent insert keyed on
/// `(class_id, meeting_date, start_time)`.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created(TranscriptArtifact),
    /// The business key already existed; the stored row is returned
    Exists(TranscriptArtifact),
}

impl InsertOutcome {
    pub fn artifact(&self) -> &TranscriptArtifact {
        match self {
            InsertOutcome::Created(a) | InsertOutcome::Exists(a) => a,
        }
    }
}

#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    /// Cheap connectivity probe for `/ready`
    async fn health_check(&self) -> bool;

    /// Insert a new transcript artifact unless its business key exists.
    async fn insert_summary(&self, new: NewTranscriptArtifact) -> Result<InsertOutcome>;

    async fn get_summary(&self, summary_id: i64) -> Result<Option<TranscriptArtifact>>;

    /// Claim-query candidates: ingestible rows whose lease is absent or has
    /// lapsed, oldest first.
    async fn find_claimable(
        &self,
        limit: u32,
        lease_duration: Duration,
    ) -> Result<Vec<TranscriptArtifact>>;

    /// Atomically transition a candidate to `processing`, stamping the lease
    /// and incrementing `processing_attempts`. The predicate includes the
    /// candidate's previous `status` and `claimed_at`, so under contention
    /// exactly one worker observes `Some`.
    async fn try_claim(
        &self,
        candidate: &TranscriptArtifact,
    ) -> Result<Option<TranscriptArtifact>>;

    /// Persist a fetched transcript and move the row to
    /// `awaiting_exercises`. Only valid while the caller holds the lease.
    async fn store_transcript(
        &self,
        summary_id: i64,
        transcript: &str,
        source: TranscriptSource,
    ) -> Result<()>;

    /// Transient failure: back to `awaiting_exercises` with the error
    /// recorded and the lease cleared, so a later tick retries.
    async fn release_for_retry(&self, summary_id: i64, error: &str) -> Result<()>;

    /// Terminal failure (`max_retries` exhausted or a data-validity fault).
    async fn mark_failed(&self, summary_id: i64, error: &str) -> Result<()>;

    /// Single logical completion write: persist the exercise set and
    /// transition the artifact to `completed`, clearing the lease. Any
    /// previously active set for the same summary is superseded
    /// (marked `rejected`) so at most one non-rejected set exists.
    async fn complete_with_exercises(
        &self,
        summary_id: i64,
        document: ExerciseDocument,
    ) -> Result<ExerciseSet>;

    /// Latest non-rejected exercise set for a summary, if any
    async fn exercise_set_for(&self, summary_id: i64) -> Result<Option<ExerciseSet>>;

    /// Read path: sets for a class (optionally one student), newest first
    async fn list_exercise_sets(
        &self,
        class_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ExerciseSet>>;
}
