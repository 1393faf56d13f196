//! REST analytical store gateway
//!
//! Talks PostgREST-style JSON to the analytical row store. Conditional
//! updates are expressed as filtered `PATCH`es with
//! `Prefer: return=representation`; an empty result array means the
//! predicate matched zero rows, i.e. the CAS was lost.

use crate::models::{
    ExerciseDocument, ExerciseSet, ExerciseSetStatus, NewTranscriptArtifact, SummaryStatus,
    TranscriptArtifact, TranscriptSource,
};
use crate::stores::analytical::{AnalyticalStore, InsertOutcome};
use crate::{time, Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const SUMMARIES_TABLE: &str = "zoom_summaries";
const EXERCISES_TABLE: &str = "lesson_exercises";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Transcript artifact row on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SummaryRow {
    id: i64,
    user_id: String,
    teacher_id: String,
    class_id: String,
    teacher_email: Option<String>,
    meeting_date: String,
    start_time: String,
    end_time: Option<String>,
    transcript: Option<String>,
    transcript_length: Option<i64>,
    transcript_source: Option<String>,
    status: String,
    processing_attempts: Option<i64>,
    last_error: Option<String>,
    claimed_at: Option<String>,
    processed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SummaryRow {
    fn into_artifact(self) -> Result<TranscriptArtifact> {
        let status = SummaryStatus::parse(&self.status).ok_or_else(|| {
            Error::Store(format!(
                "summary {} carries unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(TranscriptArtifact {
            summary_id: self.id,
            user_id: self.user_id,
            teacher_id: self.teacher_id,
            class_id: self.class_id,
            teacher_email: self.teacher_email,
            meeting_date: self.meeting_date,
            start_time: self.start_time,
            end_time: self.end_time,
            transcript_length: self
                .transcript_length
                .unwrap_or_else(|| self.transcript.as_deref().map(|t| t.len() as i64).unwrap_or(0)),
            transcript: self.transcript,
            transcript_source: self
                .transcript_source
                .as_deref()
                .map(TranscriptSource::parse)
                .unwrap_or(TranscriptSource::Unknown),
            status,
            processing_attempts: self.processing_attempts.unwrap_or(0).max(0) as u32,
            last_error: self.last_error,
            claimed_at: self.claimed_at.as_deref().and_then(time::parse_rfc3339),
            processed_at: self.processed_at.as_deref().and_then(time::parse_rfc3339),
            created_at: time::parse_rfc3339(&self.created_at).unwrap_or_else(time::now),
            updated_at: time::parse_rfc3339(&self.updated_at).unwrap_or_else(time::now),
        })
    }
}

/// Exercise set row on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExerciseRow {
    id: i64,
    summary_id: i64,
    user_id: String,
    teacher_id: String,
    class_id: String,
    generated_at: String,
    exercises: serde_json::Value,
    status: String,
}

impl ExerciseRow {
    fn into_set(self) -> Result<ExerciseSet> {
        let status = ExerciseSetStatus::parse(&self.status).ok_or_else(|| {
            Error::Store(format!(
                "exercise set {} carries unknown status '{}'",
                self.id, self.status
            ))
        })?;
        let exercises: ExerciseDocument = serde_json::from_value(self.exercises)
            .map_err(|e| Error::Store(format!("exercise set {} is malformed: {e}", self.id)))?;
        Ok(ExerciseSet {
            exercises_id: self.id,
            summary_id: self.summary_id,
            user_id: self.user_id,
            teacher_id: self.teacher_id,
            class_id: self.class_id,
            generated_at: time::parse_rfc3339(&self.generated_at).unwrap_or_else(time::now),
            exercises,
            status,
        })
    }
}

/// See module docs.
#[derive(Clone)]
pub struct RestAnalyticalStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestAnalyticalStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(api_key)
            .map_err(|_| Error::Config("analytical store key contains invalid bytes".into()))?;
        headers.insert("apikey", key_value.clone());
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::Config("analytical store key contains invalid bytes".into()))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    async fn expect_rows<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Vec<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("row store returned {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    async fn select_summaries(&self, query: &[(&str, String)]) -> Result<Vec<TranscriptArtifact>> {
        let response = self
            .http_client
            .get(self.table_url(SUMMARIES_TABLE))
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await?;
        let rows: Vec<SummaryRow> = Self::expect_rows(response).await?;
        rows.into_iter().map(SummaryRow::into_artifact).collect()
    }

    /// Filtered PATCH returning the rows it touched; the CAS verdict is the
    /// row count.
    async fn patch_summaries(
        &self,
        query: &[(&str, String)],
        body: serde_json::Value,
    ) -> Result<Vec<TranscriptArtifact>> {
        let response = self
            .http_client
            .patch(self.table_url(SUMMARIES_TABLE))
            .header("Prefer", "return=representation")
            .query(query)
            .json(&body)
            .send()
            .await?;
        let rows: Vec<SummaryRow> = Self::expect_rows(response).await?;
        rows.into_iter().map(SummaryRow::into_artifact).collect()
    }

    /// The lease-holder update: guarded so it only matches while the caller
    /// still owns the claim (`processing`, or `awaiting_exercises` with the
    /// lease stamp intact after a mid-lease transcript store). Zero matched
    /// rows means the lease was lost.
    async fn patch_owned_summary(
        &self,
        summary_id: i64,
        body: serde_json::Value,
    ) -> Result<TranscriptArtifact> {
        let rows = self
            .patch_summaries(
                &[
                    ("id", format!("eq.{summary_id}")),
                    (
                        "or",
                        format!(
                            "(status.eq.{},and(status.eq.{},claimed_at.not.is.null))",
                            SummaryStatus::Processing.as_str(),
                            SummaryStatus::AwaitingExercises.as_str()
                        ),
                    ),
                ],
                body,
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            Error::InvariantViolation(format!(
                "summary {summary_id} update matched zero rows; lease lost"
            ))
        })
    }
}

#[async_trait]
impl AnalyticalStore for RestAnalyticalStore {
    async fn health_check(&self) -> bool {
        let result = self
            .http_client
            .get(self.table_url(SUMMARIES_TABLE))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await;
        matches!(result, Ok(r) if r.status().is_success())
    }

    async fn insert_summary(&self, new: NewTranscriptArtifact) -> Result<InsertOutcome> {
        // Uniqueness guard on the business key. A concurrent insert between
        // the check and the POST is resolved by re-fetching on conflict.
        let key_filter = [
            ("class_id", format!("eq.{}", new.class_id)),
            ("meeting_date", format!("eq.{}", new.meeting_date)),
            ("start_time", format!("eq.{}", new.start_time)),
        ];
        if let Some(existing) = self.select_summaries(&key_filter).await?.into_iter().next() {
            return Ok(InsertOutcome::Exists(existing));
        }

        let now = time::now_rfc3339();
        let response = self
            .http_client
            .post(self.table_url(SUMMARIES_TABLE))
            .header("Prefer", "return=representation")
            .json(&json!({
                "user_id": new.user_id,
                "teacher_id": new.teacher_id,
                "class_id": new.class_id,
                "teacher_email": new.teacher_email,
                "meeting_date": new.meeting_date,
                "start_time": new.start_time,
                "end_time": new.end_time,
                "status": SummaryStatus::Pending.as_str(),
                "processing_attempts": 0,
                "created_at": now,
                "updated_at": now,
            }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let existing = self
                .select_summaries(&key_filter)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::Store("insert conflicted but business key is absent".into())
                })?;
            return Ok(InsertOutcome::Exists(existing));
        }

        let rows: Vec<SummaryRow> = Self::expect_rows(response).await?;
        let artifact = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("insert returned no representation".into()))?
            .into_artifact()?;
        Ok(InsertOutcome::Created(artifact))
    }

    async fn get_summary(&self, summary_id: i64) -> Result<Option<TranscriptArtifact>> {
        Ok(self
            .select_summaries(&[("id", format!("eq.{summary_id}"))])
            .await?
            .into_iter()
            .next())
    }

    async fn find_claimable(
        &self,
        limit: u32,
        lease_duration: Duration,
    ) -> Result<Vec<TranscriptArtifact>> {
        let cutoff = (time::now()
            - chrono::Duration::from_std(lease_duration)
                .map_err(|e| Error::Internal(e.to_string()))?)
        .to_rfc3339();
        self.select_summaries(&[
            (
                "status",
                format!(
                    "in.({},{})",
                    SummaryStatus::Pending.as_str(),
                    SummaryStatus::AwaitingExercises.as_str()
                ),
            ),
            ("or", format!("(claimed_at.is.null,claimed_at.lt.{cutoff})")),
            ("order", "created_at.asc".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn try_claim(
        &self,
        candidate: &TranscriptArtifact,
    ) -> Result<Option<TranscriptArtifact>> {
        let mut query = vec![
            ("id", format!("eq.{}", candidate.summary_id)),
            ("status", format!("eq.{}", candidate.status.as_str())),
        ];
        match &candidate.claimed_at {
            Some(claimed) => query.push(("claimed_at", format!("eq.{}", claimed.to_rfc3339()))),
            None => query.push(("claimed_at", "is.null".to_string())),
        }

        let rows = self
            .patch_summaries(
                &query,
                json!({
                    "status": SummaryStatus::Processing.as_str(),
                    "claimed_at": time::now_rfc3339(),
                    "processing_attempts": candidate.processing_attempts + 1,
                    "updated_at": time::now_rfc3339(),
                }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn store_transcript(
        &self,
        summary_id: i64,
        transcript: &str,
        source: TranscriptSource,
    ) -> Result<()> {
        self.patch_owned_summary(
            summary_id,
            json!({
                "transcript": transcript,
                "transcript_length": transcript.len(),
                "transcript_source": source.as_str(),
                "status": SummaryStatus::AwaitingExercises.as_str(),
                "updated_at": time::now_rfc3339(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn release_for_retry(&self, summary_id: i64, error: &str) -> Result<()> {
        self.patch_owned_summary(
            summary_id,
            json!({
                "status": SummaryStatus::AwaitingExercises.as_str(),
                "last_error": error,
                "claimed_at": serde_json::Value::Null,
                "updated_at": time::now_rfc3339(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, summary_id: i64, error: &str) -> Result<()> {
        self.patch_owned_summary(
            summary_id,
            json!({
                "status": SummaryStatus::Failed.as_str(),
                "last_error": error,
                "claimed_at": serde_json::Value::Null,
                "updated_at": time::now_rfc3339(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn complete_with_exercises(
        &self,
        summary_id: i64,
        document: ExerciseDocument,
    ) -> Result<ExerciseSet> {
        let summary = self
            .get_summary(summary_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("summary {summary_id}")))?;
        let owns_lease = summary.status == SummaryStatus::Processing
            || (summary.status == SummaryStatus::AwaitingExercises
                && summary.claimed_at.is_some());
        if !owns_lease {
            return Err(Error::InvariantViolation(format!(
                "summary {summary_id} is {} without a lease",
                summary.status.as_str()
            )));
        }

        // Supersede any previously active set first so the at-most-one
        // invariant holds even if a crash interleaves the writes.
        let response = self
            .http_client
            .patch(self.table_url(EXERCISES_TABLE))
            .query(&[
                ("summary_id", format!("eq.{summary_id}")),
                (
                    "status",
                    format!("neq.{}", ExerciseSetStatus::Rejected.as_str()),
                ),
            ])
            .json(&json!({ "status": ExerciseSetStatus::Rejected.as_str() }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "superseding old exercise sets failed: {status}: {body}"
            )));
        }

        let exercises_doc = serde_json::to_value(&document)
            .map_err(|e| Error::Internal(format!("exercise document not serializable: {e}")))?;
        let response = self
            .http_client
            .post(self.table_url(EXERCISES_TABLE))
            .header("Prefer", "return=representation")
            .json(&json!({
                "summary_id": summary_id,
                "user_id": summary.user_id,
                "teacher_id": summary.teacher_id,
                "class_id": summary.class_id,
                "generated_at": time::now_rfc3339(),
                "exercises": exercises_doc,
                "status": ExerciseSetStatus::PendingApproval.as_str(),
            }))
            .send()
            .await?;
        let rows: Vec<ExerciseRow> = Self::expect_rows(response).await?;
        let set = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("exercise insert returned no representation".into()))?
            .into_set()?;

        self.patch_owned_summary(
            summary_id,
            json!({
                "status": SummaryStatus::Completed.as_str(),
                "processed_at": time::now_rfc3339(),
                "claimed_at": serde_json::Value::Null,
                "updated_at": time::now_rfc3339(),
            }),
        )
        .await?;

        Ok(set)
    }

    async fn exercise_set_for(&self, summary_id: i64) -> Result<Option<ExerciseSet>> {
        let response = self
            .http_client
            .get(self.table_url(EXERCISES_TABLE))
            .query(&[
                ("select", "*".to_string()),
                ("summary_id", format!("eq.{summary_id}")),
                (
                    "status",
                    format!("neq.{}", ExerciseSetStatus::Rejected.as_str()),
                ),
                ("order", "generated_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<ExerciseRow> = Self::expect_rows(response).await?;
        rows.into_iter().next().map(ExerciseRow::into_set).transpose()
    }

    async fn list_exercise_sets(
        &self,
        class_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ExerciseSet>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("class_id", format!("eq.{class_id}")),
            ("order", "generated_at.desc".to_string()),
        ];
        if let Some(user_id) = user_id {
            query.push(("user_id", format!("eq.{user_id}")));
        }
        let response = self
            .http_client
            .get(self.table_url(EXERCISES_TABLE))
            .query(&query)
            .send()
            .await?;
        let rows: Vec<ExerciseRow> = Self::expect_rows(response).await?;
        rows.into_iter().map(ExerciseRow::into_set).collect()
    }
}
