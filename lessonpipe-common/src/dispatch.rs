//! Outbound webhook dispatch client
//!
//! One call, one POST: retry cadence belongs to the polling loops, never to
//! the client itself. Outcomes are classified so callers can tell "try
//! again next tick" from "stop until someone looks at this".

use crate::models::EndedClass;
use crate::{time, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Webhook request body (§ outbound wire contract). All clock fields are
/// strings: `date` is `YYYY-MM-DD`, times are `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_email: Option<String>,
}

impl WebhookPayload {
    /// Compose the payload for an ended class. A missing teacher email is
    /// non-fatal; the field is omitted.
    pub fn from_class(class: &EndedClass) -> Self {
        Self {
            user_id: class.student_id.clone(),
            teacher_id: class.teacher_id.clone(),
            class_id: class.class_id.clone(),
            date: time::wire_date(&class.meeting_start),
            start_time: time::wire_time(&class.meeting_start),
            end_time: time::wire_time(&class.meeting_end),
            teacher_email: class.teacher_email.clone(),
        }
    }
}

/// Classified result of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Any 2xx
    Success,
    /// 408 / 429 / 5xx / network error / timeout; the polling cadence
    /// provides the retry
    Retryable(String),
    /// Any other 4xx; re-attempted only by future ticks, never escalated
    Permanent(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Seam for the monitor and the trigger surface; production uses
/// [`HttpDispatcher`], tests script outcomes.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, payload: &WebhookPayload, idempotency_key: &str) -> DispatchOutcome;
}

/// Production webhook client
pub struct HttpDispatcher {
    http_client: reqwest::Client,
    webhook_url: String,
}

impl HttpDispatcher {
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, payload: &WebhookPayload, idempotency_key: &str) -> DispatchOutcome {
        debug!(
            class_id = %payload.class_id,
            idempotency_key = %idempotency_key,
            "Dispatching webhook"
        );

        let response = self
            .http_client
            .post(&self.webhook_url)
            .header("Idempotency-Key", idempotency_key)
            .json(payload)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return DispatchOutcome::Retryable(format!("timeout: {e}"));
            }
            Err(e) => {
                return DispatchOutcome::Retryable(format!("network error: {e}"));
            }
        };

        let status = response.status();
        if status.is_success() {
            return DispatchOutcome::Success;
        }

        let body = response.text().await.unwrap_or_default();
        let reason = format!("{status}: {}", body.chars().take(200).collect::<String>());

        match status.as_u16() {
            408 | 429 => DispatchOutcome::Retryable(reason),
            code if code >= 500 => DispatchOutcome::Retryable(reason),
            _ => {
                warn!(
                    class_id = %payload.class_id,
                    status = status.as_u16(),
                    "Webhook rejected dispatch permanently"
                );
                DispatchOutcome::Permanent(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_payload_from_class_formats_wire_fields() {
        let class = EndedClass {
            class_id: "c-1".to_string(),
            student_id: "s-1".to_string(),
            teacher_id: "t-1".to_string(),
            meeting_start: chrono::Utc.with_ymd_and_hms(2025, 11, 24, 17, 0, 0).unwrap(),
            meeting_end: chrono::Utc.with_ymd_and_hms(2025, 11, 24, 17, 30, 0).unwrap(),
            zoom_id: None,
            teacher_email: Some("teacher@example.com".to_string()),
        };

        let payload = WebhookPayload::from_class(&class);
        assert_eq!(payload.user_id, "s-1");
        assert_eq!(payload.date, "2025-11-24");
        assert_eq!(payload.start_time, "17:00");
        assert_eq!(payload.end_time, "17:30");
        assert_eq!(payload.teacher_email.as_deref(), Some("teacher@example.com"));
    }

    #[test]
    fn test_missing_email_is_omitted_from_body() {
        let payload = WebhookPayload {
            user_id: "s-1".into(),
            teacher_id: "t-1".into(),
            class_id: "c-1".into(),
            date: "2025-11-24".into(),
            start_time: "17:00".into(),
            end_time: "17:30".into(),
            teacher_email: None,
        };
        let body = serde_json::to_value(&payload).unwrap();
        assert!(body.get("teacher_email").is_none());
    }

    #[test]
    fn test_client_creation() {
        let dispatcher = HttpDispatcher::new("https://hooks.example.com/flow", Duration::from_secs(30));
        assert!(dispatcher.is_ok());
    }
}
