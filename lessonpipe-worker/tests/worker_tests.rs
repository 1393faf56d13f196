//! Integration tests for the transcript worker and the end-to-end pipeline
//!
//! Runs the monitor and worker against an in-memory operational store
//! (SQLite) and the in-memory analytical store, with scripted dispatcher
//! and LLM collaborators for failure injection.

use async_trait::async_trait;
use lessonpipe_common::config::{MonitorConfig, WorkerConfig};
use lessonpipe_common::dispatch::{DispatchOutcome, Dispatcher, WebhookPayload};
use lessonpipe_common::models::{NewTranscriptArtifact, SummaryStatus};
use lessonpipe_common::stores::{operational, AnalyticalStore, MemoryAnalyticalStore};
use lessonpipe_worker::engine::llm::{LanguageModel, LlmError, LlmVocabSuggestion};
use lessonpipe_worker::engine::ExerciseEngine;
use lessonpipe_worker::monitor::ClassMonitor;
use lessonpipe_worker::worker::TranscriptWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RICH_TRANSCRIPT: &str = "\
Teacher: Today we will talk about the morning routine and food.
Sara: I eat breakfast before school every day.
Teacher: That is a lovely sentence about breakfast habits.
Sara: The weather was cold in my city yesterday.
Teacher: The weather changes quickly in the autumn season.
Sara: I watched the street from my window this morning.
Teacher: A window seat is the best place for reading.
Sara: My father bought a new camera for the holiday.
Teacher: A good camera makes the holiday photos much better.
Sara: We visited the garden near the museum with my cousin.
Teacher: The museum garden has many flowers in spring.
Sara: I bought a ticket and some coffee at the market.
Teacher: The market sells fresh coffee and cheap ticket bundles.
Teacher: Don't say 'I goed to market', say 'I went to the market'.
Sara: I went to the market.
Teacher: Not 'she buyed a ticket', say 'she bought a ticket'.";

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_secs(60),
        batch_size: 10,
        max_retries: 5,
        lease_duration: Duration::from_secs(600),
        engine_deadline: Duration::from_secs(60),
    }
}

fn new_artifact(class_id: &str) -> NewTranscriptArtifact {
    NewTranscriptArtifact {
        user_id: "s-1".to_string(),
        teacher_id: "t-1".to_string(),
        class_id: class_id.to_string(),
        teacher_email: Some("teacher@example.com".to_string()),
        meeting_date: "2025-11-24".to_string(),
        start_time: "17:00".to_string(),
        end_time: Some("17:30".to_string()),
    }
}

fn worker_for(store: &MemoryAnalyticalStore) -> TranscriptWorker {
    TranscriptWorker::new(
        Arc::new(store.clone()),
        ExerciseEngine::new(60, None, None),
        None,
        worker_config(),
    )
}

struct AlwaysOkDispatcher;

#[async_trait]
impl Dispatcher for AlwaysOkDispatcher {
    async fn dispatch(&self, _payload: &WebhookPayload, _key: &str) -> DispatchOutcome {
        DispatchOutcome::Success
    }
}

/// An LLM whose calls outlast the engine deadline, to force timeouts
struct SlowModel;

#[async_trait]
impl LanguageModel for SlowModel {
    async fn extract_vocabulary(
        &self,
        _transcript: &str,
        _max_words: usize,
    ) -> Result<Vec<LlmVocabSuggestion>, LlmError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(LlmError::Unavailable("slow".to_string()))
    }

    async fn select_sentences(
        &self,
        _candidates: &[String],
        _max: usize,
    ) -> Result<Vec<String>, LlmError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(LlmError::Unavailable("slow".to_string()))
    }
}

#[tokio::test]
async fn test_nominal_path_end_to_end() {
    // Monitor side: an ended class dispatches once and is marked.
    let pool = operational::init_operational_store("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (user_id, email) VALUES ('t-1', 'teacher@example.com')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO classes (class_id, student_id, teacher_id, status, meeting_start, meeting_end)
         VALUES ('c-1', 's-1', 't-1', 'ended', '2025-11-24T17:00:00Z', '2025-11-24T17:30:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let monitor = ClassMonitor::new(
        pool.clone(),
        Arc::new(AlwaysOkDispatcher),
        MonitorConfig {
            poll_interval: Duration::from_secs(60),
            batch_size: 50,
            webhook_timeout: Duration::from_secs(30),
        },
    );
    let stats = monitor.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.dispatched, 1);

    // The external workflow writes the transcript into the analytical
    // store and leaves the row at awaiting_exercises.
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(
            new_artifact("c-1"),
            Some(RICH_TRANSCRIPT.to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    // Worker side: claim, generate, complete.
    let worker = worker_for(&store);
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.completed, 1);

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::Completed);
    assert!(row.processed_at.is_some());
    assert!(row.claimed_at.is_none());
    assert_eq!(row.processing_attempts, 1);

    let sets = store.list_exercise_sets("c-1", None).await.unwrap();
    assert_eq!(sets.len(), 1);
    let counts = &sets[0].exercises.counts;
    assert!((8..=15).contains(&counts.flashcards));
    assert!((6..=10).contains(&counts.cloze));
    assert!((6..=10).contains(&counts.grammar));
    assert!((6..=10).contains(&counts.sentence));

    // Filtering by the student also returns it; a stranger gets nothing.
    assert_eq!(
        store.list_exercise_sets("c-1", Some("s-1")).await.unwrap().len(),
        1
    );
    assert!(store
        .list_exercise_sets("c-1", Some("someone-else"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_short_transcript_fails_without_invoking_engine() {
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(
            new_artifact("c-1"),
            Some(String::new()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    let worker = worker_for(&store);
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.failed, 1);

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::Failed);
    assert_eq!(
        row.last_error.as_deref(),
        Some("transcript missing or too short")
    );
    assert!(store.all_exercise_sets().await.is_empty());
}

#[tokio::test]
async fn test_missing_transcript_pending_row_fails_the_same_way() {
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(new_artifact("c-1"), None, SummaryStatus::Pending)
        .await;

    let worker = worker_for(&store);
    worker.tick(&CancellationToken::new()).await.unwrap();

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::Failed);
}

#[tokio::test]
async fn test_engine_deadline_releases_row_for_retry() {
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(
            new_artifact("c-1"),
            Some(RICH_TRANSCRIPT.to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    let mut config = worker_config();
    config.engine_deadline = Duration::from_millis(50);
    let worker = TranscriptWorker::new(
        Arc::new(store.clone()),
        ExerciseEngine::new(60, Some(Arc::new(SlowModel)), None),
        None,
        config,
    );

    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.retried, 1);

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::AwaitingExercises);
    assert_eq!(row.processing_attempts, 1);
    assert!(row.claimed_at.is_none());
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .contains("deadline exceeded"));
    // The transcript survives the retry transition.
    assert!(row.transcript.is_some());
}

#[tokio::test]
async fn test_exhausted_retries_become_terminal_failure() {
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(
            new_artifact("c-1"),
            Some(RICH_TRANSCRIPT.to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    let mut config = worker_config();
    config.engine_deadline = Duration::from_millis(50);
    config.max_retries = 2;
    let worker = TranscriptWorker::new(
        Arc::new(store.clone()),
        ExerciseEngine::new(60, Some(Arc::new(SlowModel)), None),
        None,
        config,
    );

    // Attempt 1 releases, attempt 2 exhausts the budget.
    worker.tick(&CancellationToken::new()).await.unwrap();
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.failed, 1);

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::Failed);
    assert_eq!(row.processing_attempts, 2);
}

#[tokio::test]
async fn test_stale_lease_is_reclaimed_by_another_worker() {
    let store = MemoryAnalyticalStore::new();
    let artifact = store
        .seed_summary(
            new_artifact("c-1"),
            Some(RICH_TRANSCRIPT.to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    // Worker A claims the row and crashes without finishing.
    let claimed = store.try_claim(&artifact).await.unwrap().unwrap();
    assert_eq!(claimed.processing_attempts, 1);

    // Before the lease lapses nobody can touch the row.
    let worker = worker_for(&store);
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.claimed, 0);

    // After the lease lapses worker B reclaims and completes.
    store
        .age_claim(claimed.summary_id, Duration::from_secs(1200))
        .await;
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.completed, 1);

    let row = store.summary(artifact.summary_id).await.unwrap();
    assert_eq!(row.status, SummaryStatus::Completed);
    assert_eq!(row.processing_attempts, 2);
}

#[tokio::test]
async fn test_concurrent_workers_complete_each_row_exactly_once() {
    let store = MemoryAnalyticalStore::new();
    for i in 0..4 {
        store
            .seed_summary(
                {
                    let mut new = new_artifact(&format!("c-{i}"));
                    new.meeting_date = format!("2025-11-{:02}", 10 + i);
                    new
                },
                Some(RICH_TRANSCRIPT.to_string()),
                SummaryStatus::AwaitingExercises,
            )
            .await;
    }

    let a = worker_for(&store);
    let b = worker_for(&store);
    let token_a = CancellationToken::new();
    let token_b = CancellationToken::new();
    let (ra, rb) = tokio::join!(a.tick(&token_a), b.tick(&token_b));
    let completed = ra.unwrap().completed + rb.unwrap().completed;
    assert_eq!(completed, 4);

    // One active exercise set per summary, across both workers.
    let sets = store.all_exercise_sets().await;
    assert_eq!(sets.len(), 4);
    let mut summary_ids: Vec<i64> = sets.iter().map(|s| s.summary_id).collect();
    summary_ids.sort();
    summary_ids.dedup();
    assert_eq!(summary_ids.len(), 4);
}

#[tokio::test]
async fn test_completed_rows_are_never_reprocessed() {
    let store = MemoryAnalyticalStore::new();
    store
        .seed_summary(
            new_artifact("c-1"),
            Some(RICH_TRANSCRIPT.to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    let worker = worker_for(&store);
    worker.tick(&CancellationToken::new()).await.unwrap();
    let stats = worker.tick(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.claimed, 0);
    assert_eq!(store.all_exercise_sets().await.len(), 1);
}
