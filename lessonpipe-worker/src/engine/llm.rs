//! Optional LLM collaborator
//!
//! The engine treats the language model as an external capability that is
//! `available`, `rate_limited`, or `unavailable`. Any non-available outcome
//! routes the stage to its heuristic fallback; the engine never fails
//! because the model did.

use async_trait::async_trait;
use lessonpipe_common::config::EngineConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const LLM_TIMEOUT_SECS: u64 = 30;
/// Transcript excerpt length sent with each prompt
const PROMPT_TRANSCRIPT_CHARS: usize = 2500;

/// Why an LLM stage did not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    RateLimited,
    Unavailable(String),
    Malformed(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::RateLimited => write!(f, "rate limited"),
            LlmError::Unavailable(reason) => write!(f, "unavailable: {reason}"),
            LlmError::Malformed(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

/// Vocabulary suggestion as returned by the model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmVocabSuggestion {
    pub word: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// Seam for the two LLM-preferred stages
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Up to `max_words` pedagogically valuable words with short definitions
    async fn extract_vocabulary(
        &self,
        transcript: &str,
        max_words: usize,
    ) -> Result<Vec<LlmVocabSuggestion>, LlmError>;

    /// Up to `max` teachable sentences chosen from the candidates
    async fn select_sentences(
        &self,
        candidates: &[String],
        max: usize,
    ) -> Result<Vec<String>, LlmError>;
}

/// Chat-completions client against an OpenAI-compatible endpoint
pub struct ChatCompletionsModel {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsModel {
    /// Returns `None` when no API key is configured (the LLM path is
    /// disabled, not degraded).
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        let api_key = config.llm_api_key.clone()?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .build()
            .ok()?;
        Some(Self {
            http_client,
            base_url: config.llm_base_url.clone(),
            api_key,
            model: config.llm_model.clone(),
        })
    }

    async fn complete(&self, prompt: String) -> Result<String, LlmError> {
        let response = self
            .http_client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("LLM rate limited");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!("{status}: {body}")));
        }

        #[derive(Deserialize)]
        struct Completion {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("response carried no text content".to_string()))
    }
}

/// Strip markdown code fences the model sometimes wraps JSON in
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    async fn extract_vocabulary(
        &self,
        transcript: &str,
        max_words: usize,
    ) -> Result<Vec<LlmVocabSuggestion>, LlmError> {
        let excerpt: String = transcript.chars().take(PROMPT_TRANSCRIPT_CHARS).collect();
        let prompt = format!(
            "Analyze this lesson transcript and pick up to {max_words} English words or short \
             phrases an intermediate learner should study. For each item return \"word\", a short \
             \"definition\", and \"difficulty\" (beginner, intermediate, or advanced).\n\n\
             Transcript:\n{excerpt}\n\n\
             Respond with ONLY a JSON array of objects, no commentary."
        );

        let content = self.complete(prompt).await?;
        let raw = extract_json_array(&content)
            .ok_or_else(|| LlmError::Malformed("no JSON array in response".to_string()))?;
        let suggestions: Vec<LlmVocabSuggestion> =
            serde_json::from_str(raw).map_err(|e| LlmError::Malformed(e.to_string()))?;

        debug!(count = suggestions.len(), "LLM vocabulary extracted");
        Ok(suggestions
            .into_iter()
            .filter(|s| !s.word.trim().is_empty())
            .take(max_words)
            .collect())
    }

    async fn select_sentences(
        &self,
        candidates: &[String],
        max: usize,
    ) -> Result<Vec<String>, LlmError> {
        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{i}: {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "From the numbered sentences below, choose up to {max} that are most useful for a \
             language learner to practice (complete, natural, self-contained).\n\n{listing}\n\n\
             Respond with ONLY a JSON array of the chosen sentence numbers."
        );

        let content = self.complete(prompt).await?;
        let raw = extract_json_array(&content)
            .ok_or_else(|| LlmError::Malformed("no JSON array in response".to_string()))?;
        let indices: Vec<usize> =
            serde_json::from_str(raw).map_err(|e| LlmError::Malformed(e.to_string()))?;

        Ok(indices
            .into_iter()
            .filter_map(|i| candidates.get(i).cloned())
            .take(max)
            .collect())
    }
}
