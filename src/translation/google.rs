//! Google 网页翻译接口（非流式）

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::error::TranslationError;
use super::types::{TranslationRequest, TranslationResult};
use super::Translator;

pub const DEFAULT_GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    sentences: Vec<GoogleSentence>,
    src: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleSentence {
    trans: Option<String>,
    src_translit: Option<String>,
}

pub struct GoogleTranslator {
    client: Client,
    endpoint: String,
    timeout: Option<Duration>,
}

impl GoogleTranslator {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslationError> {
        debug!("[GoogleTranslator] 请求: {}", self.endpoint);
        let mut builder = self
            .client
            .get(&self.endpoint)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .query(&[
                ("client", "gtx"),
                ("sl", request.source_language()),
                ("tl", request.target_language()),
                ("dt", "t"),
                ("dj", "1"),
                ("q", request.text()),
            ]);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            error!("[GoogleTranslator] HTTP {}", status);
            return Err(TranslationError::provider(
                Some(status.as_u16()),
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                ),
            ));
        }

        let data: GoogleResponse = response.json().await?;
        if data.sentences.is_empty() {
            return Err(TranslationError::EmptyResult);
        }

        let translated: String = data
            .sentences
            .iter()
            .filter_map(|s| s.trans.as_deref())
            .collect();
        let translated = if translated.is_empty() {
            request.text().to_string()
        } else {
            translated
        };

        Ok(TranslationResult {
            original_text: request.text().to_string(),
            translated_text: translated,
            source_language: Some(
                data.src
                    .unwrap_or_else(|| request.source_language().to_string()),
            ),
            target_language: Some(request.target_language().to_string()),
            pronunciation: data.sentences.first().and_then(|s| s.src_translit.clone()),
        })
    }
}
