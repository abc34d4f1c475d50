//! Klasyfikator tekstu (LLM) dla detektora czatu. Endpoint zgodny z OpenAI (`/chat/completions`).

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, ConfigError};

#[async_trait]
pub trait TextClassifier: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn classify(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ClassifierError>;
}

pub struct OpenAiCompatClassifier {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    limiter: DefaultDirectRateLimiter,
}

impl OpenAiCompatClassifier {
    /// `Ok(None)` gdy klasyfikator jest wyłączony albo nie ma adresu.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Option<Self>, ConfigError> {
        let base = cfg.base_url.trim().trim_end_matches('/');
        if !cfg.enabled || base.is_empty() {
            return Ok(None);
        }
        let per_minute = NonZeroU32::new(cfg.requests_per_minute).ok_or(ConfigError::Invalid {
            field: "classifier.requests_per_minute",
            reason: "must be positive".into(),
        })?;
        let http = Client::builder()
            .user_agent("TGG-Classifier/1.0")
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "classifier",
                reason: e.to_string(),
            })?;

        Ok(Some(Self {
            http,
            endpoint: format!("{base}/chat/completions"),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            model: cfg.model.clone(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextClassifier for OpenAiCompatClassifier {
    async fn classify(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ClassifierError> {
        if self.limiter.check().is_err() {
            return Err(ClassifierError::RateLimited);
        }

        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });
        let mut req = self.http.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        // brak połączenia lub timeout = usługa niedostępna, reszta to błąd HTTP
        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ClassifierError::Unavailable
            } else {
                ClassifierError::Http(e)
            }
        })?;
        let resp: CompletionResponse = resp.error_for_status()?.json().await?;
        let answer = resp
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ClassifierError::EmptyAnswer)?;

        debug!(model = %self.model, %answer, "classifier answered");
        Ok(answer)
    }
}
