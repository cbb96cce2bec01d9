//! Gemini `generateContent` client.
//!
//! Transient failures (connect errors, timeouts, 429, 5xx) retry with
//! exponential backoff and full jitter; other 4xx statuses propagate
//! immediately as permanent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chaptersmith_core::{Error, Result};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use crate::gate::RequestGate;
use crate::oracle::{OracleConfig, TextOracle};

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 10_000;

enum CallFailure {
    Transient(String),
    Permanent(String),
}

pub struct GeminiOracle {
    client: Client,
    config: OracleConfig,
    api_key: String,
    gate: Arc<RequestGate>,
}

impl GeminiOracle {
    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    pub fn from_env(config: OracleConfig, gate: Arc<RequestGate>) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::InvalidInput(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(config, api_key, gate))
    }

    pub fn new(config: OracleConfig, api_key: String, gate: Arc<RequestGate>) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
            gate,
        }
    }

    async fn send(&self, prompt: &str) -> std::result::Result<String, CallFailure> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.api_key
        );

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CallFailure::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("API error {status}: {}", truncate(&text, 200));
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(CallFailure::Transient(message))
            } else {
                Err(CallFailure::Permanent(message))
            };
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallFailure::Transient(format!("bad response body: {e}")))?;

        let parts = parsed["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                CallFailure::Permanent("response has no candidate parts".into())
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl TextOracle for GeminiOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 0..self.config.max_attempts {
            let _permit = self.gate.acquire().await?;

            let call = tokio::time::timeout(
                Duration::from_secs(self.config.call_timeout_secs),
                self.send(prompt),
            )
            .await;

            match call {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(CallFailure::Permanent(message))) => {
                    return Err(Error::Http(message));
                }
                Ok(Err(CallFailure::Transient(message))) => {
                    last_error = message;
                }
                Err(_) => {
                    last_error =
                        format!("call timed out after {}s", self.config.call_timeout_secs);
                }
            }

            if attempt + 1 < self.config.max_attempts {
                let cap = (BACKOFF_BASE_MS << attempt).min(BACKOFF_CAP_MS);
                let sleep_ms = rand::thread_rng().gen_range(0..=cap);
                debug!(
                    "Oracle attempt {}/{} failed ({}), backing off {}ms",
                    attempt + 1,
                    self.config.max_attempts,
                    last_error,
                    sleep_ms
                );
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            }
        }

        warn!("Oracle exhausted retry budget: {last_error}");
        Err(Error::OracleUnavailable(last_error))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
