//! Optional translation collaborator
//!
//! Translation failures are never errors: the item is still emitted with an
//! empty translation and the metadata flags the gap.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const TRANSLATE_BASE_URL: &str = "https://translate.googleapis.com/translate_a/single";
const TRANSLATE_TIMEOUT_SECS: u64 = 10;

/// Seam for the per-term translation stage
#[async_trait]
pub trait Translator: Send + Sync {
    /// `None` on any failure; callers emit the item untranslated
    async fn translate(&self, text: &str) -> Option<String>;
}

/// Public-endpoint translator to the configured target language
pub struct HttpTranslator {
    http_client: reqwest::Client,
    target_language: String,
}

impl HttpTranslator {
    pub fn new(target_language: &str) -> Option<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TRANSLATE_TIMEOUT_SECS))
            .build()
            .ok()?;
        Some(Self {
            http_client,
            target_language: target_language.to_string(),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str) -> Option<String> {
        let response = self
            .http_client
            .get(TRANSLATE_BASE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", "en"),
                ("tl", self.target_language.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Translation request rejected");
            return None;
        }

        // Response shape: [[["translated text", "source text", ...], ...], ...]
        let body: Value = response.json().await.ok()?;
        let translated = body
            .get(0)?
            .as_array()?
            .iter()
            .filter_map(|segment| segment.get(0)?.as_str())
            .collect::<String>();

        let translated = translated.trim().to_string();
        (!translated.is_empty()).then_some(translated)
    }
}
