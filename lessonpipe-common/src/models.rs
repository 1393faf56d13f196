//! Domain models shared across the lessonpipe services
//!
//! Transcript artifacts progress through the state machine owned by the
//! transcript worker:
//!
//! ```text
//!   pending ─▶ processing ─▶ awaiting_exercises ─▶ completed
//!      ▲          │                │
//!      │          ▼                ▼
//!      └──── failed ◀────────── failed
//! ```
//!
//! In the deployed topology the external workflow writes transcripts
//! directly, so rows usually enter at `awaiting_exercises`; both `pending`
//! and `awaiting_exercises` are ingestible by the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ended class as seen by the class monitor: the snapshot row joined
/// with the teacher's email, ready for payload composition.
#[derive(Debug, Clone)]
pub struct EndedClass {
    pub class_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub meeting_start: DateTime<Utc>,
    pub meeting_end: DateTime<Utc>,
    pub zoom_id: Option<String>,
    /// Resolved by lookup; a missing email is non-fatal
    pub teacher_email: Option<String>,
}

/// Lifecycle state of a transcript artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// Row exists, transcript may not have arrived yet
    Pending,
    /// A worker holds the lease on this row
    Processing,
    /// Transcript present, exercise generation not yet done
    AwaitingExercises,
    /// Exercise set persisted
    Completed,
    /// Terminal until an external reset clears counters
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Processing => "processing",
            SummaryStatus::AwaitingExercises => "awaiting_exercises",
            SummaryStatus::Completed => "completed",
            SummaryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SummaryStatus::Pending),
            "processing" => Some(SummaryStatus::Processing),
            "awaiting_exercises" => Some(SummaryStatus::AwaitingExercises),
            "completed" => Some(SummaryStatus::Completed),
            "failed" => Some(SummaryStatus::Failed),
            _ => None,
        }
    }

    /// Whether the worker's claim query may select a row in this state
    pub fn is_claimable(&self) -> bool {
        matches!(self, SummaryStatus::Pending | SummaryStatus::AwaitingExercises)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SummaryStatus::Completed | SummaryStatus::Failed)
    }

    /// Legal edges of the artifact state machine. `Failed -> Pending` is the
    /// external reset path; everything else belongs to the worker.
    pub fn can_transition_to(&self, next: SummaryStatus) -> bool {
        use SummaryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, AwaitingExercises)
                | (Pending, Failed)
                | (AwaitingExercises, Processing)
                | (AwaitingExercises, Completed)
                | (AwaitingExercises, Failed)
                | (Processing, AwaitingExercises)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

/// Where the transcript text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    ZoomNative,
    ExternalStt,
    Unknown,
}

impl TranscriptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::ZoomNative => "zoom_native",
            TranscriptSource::ExternalStt => "external_stt",
            TranscriptSource::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "zoom_native" => TranscriptSource::ZoomNative,
            "external_stt" => TranscriptSource::ExternalStt,
            _ => TranscriptSource::Unknown,
        }
    }
}

/// One lesson's transcript lifecycle row in the analytical store
/// (`zoom_summaries`). The business key `(class_id, meeting_date,
/// start_time)` is unique; `summary_id` is store-assigned and monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    pub summary_id: i64,
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub teacher_email: Option<String>,
    /// `YYYY-MM-DD`
    pub meeting_date: String,
    /// `HH:MM`
    pub start_time: String,
    pub end_time: Option<String>,
    pub transcript: Option<String>,
    pub transcript_length: i64,
    pub transcript_source: TranscriptSource,
    pub status: SummaryStatus,
    pub processing_attempts: u32,
    pub last_error: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscriptArtifact {
    /// Whether the stored transcript clears the minimum-length gate
    pub fn has_usable_transcript(&self, min_chars: usize) -> bool {
        self.transcript
            .as_deref()
            .map(|t| t.trim().chars().count() >= min_chars)
            .unwrap_or(false)
    }
}

/// Insert payload for a new transcript artifact (trigger path)
#[derive(Debug, Clone)]
pub struct NewTranscriptArtifact {
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub teacher_email: Option<String>,
    pub meeting_date: String,
    pub start_time: String,
    pub end_time: Option<String>,
}

/// Item difficulty grading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

/// Which path produced a given exercise type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseSource {
    Llm,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub word: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    pub example_sentence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClozeItem {
    /// Sentence with exactly one `_____` blank
    pub sentence: String,
    /// Four distinct options containing the answer
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarItem {
    /// Prompt with one blank targeting a grammar point
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceBuilderItem {
    pub english_sentence: String,
    /// Ordered tokens; punctuation kept as its own token
    pub sentence_tokens: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distractors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExerciseCounts {
    pub flashcards: usize,
    pub cloze: usize,
    pub grammar: usize,
    pub sentence: usize,
}

/// Per-type source flags reported in metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExerciseSources {
    pub flashcards: ExerciseSource,
    pub cloze: ExerciseSource,
    pub grammar: ExerciseSource,
    pub sentence: ExerciseSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseMetadata {
    pub quality_passed: bool,
    /// 0..=100
    pub quality_score: u32,
    pub vocabulary_count: usize,
    pub sentences_count: usize,
    pub translation_present: bool,
    pub sources: ExerciseSources,
}

/// The single `exercises` document persisted per lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseDocument {
    pub flashcards: Vec<Flashcard>,
    pub cloze: Vec<ClozeItem>,
    pub grammar: Vec<GrammarItem>,
    pub sentence: Vec<SentenceBuilderItem>,
    pub counts: ExerciseCounts,
    pub metadata: ExerciseMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseSetStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl ExerciseSetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseSetStatus::PendingApproval => "pending_approval",
            ExerciseSetStatus::Approved => "approved",
            ExerciseSetStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_approval" => Some(ExerciseSetStatus::PendingApproval),
            "approved" => Some(ExerciseSetStatus::Approved),
            "rejected" => Some(ExerciseSetStatus::Rejected),
            _ => None,
        }
    }
}

/// Generated exercise bundle row (`lesson_exercises`). Immutable after
/// insert except for `status`. At most one set per `summary_id` may be in a
/// non-rejected status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub exercises_id: i64,
    pub summary_id: i64,
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub generated_at: DateTime<Utc>,
    pub exercises: ExerciseDocument,
    pub status: ExerciseSetStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            SummaryStatus::Pending,
            SummaryStatus::Processing,
            SummaryStatus::AwaitingExercises,
            SummaryStatus::Completed,
            SummaryStatus::Failed,
        ] {
            assert_eq!(SummaryStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SummaryStatus::parse("bogus"), None);
    }

    #[test]
    fn test_transitions_follow_state_diagram() {
        use SummaryStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(AwaitingExercises));
        assert!(AwaitingExercises.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(AwaitingExercises));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));

        // The transcript-fetch path completes from awaiting_exercises
        // while still holding the lease.
        assert!(AwaitingExercises.can_transition_to(Completed));

        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_usable_transcript_gate() {
        let mut artifact = sample_artifact();
        artifact.transcript = Some("short".to_string());
        assert!(!artifact.has_usable_transcript(100));
        artifact.transcript = Some("x".repeat(100));
        assert!(artifact.has_usable_transcript(100));
        artifact.transcript = None;
        assert!(!artifact.has_usable_transcript(100));
    }

    fn sample_artifact() -> TranscriptArtifact {
        TranscriptArtifact {
            summary_id: 1,
            user_id: "s-1".to_string(),
            teacher_id: "t-1".to_string(),
            class_id: "c-1".to_string(),
            teacher_email: None,
            meeting_date: "2025-11-24".to_string(),
            start_time: "17:00".to_string(),
            end_time: Some("17:30".to_string()),
            transcript: None,
            transcript_length: 0,
            transcript_source: TranscriptSource::Unknown,
            status: SummaryStatus::Pending,
            processing_attempts: 0,
            last_error: None,
            claimed_at: None,
            processed_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}
