//! The oracle capability trait.
//!
//! The engine treats every oracle value as untrusted: each caller validates
//! the completion or falls back to a conservative default. The trait is the
//! seam that lets tests substitute a scripted oracle for the live API.

use async_trait::async_trait;
use chaptersmith_core::Result;
use serde::{Deserialize, Serialize};

/// A text-generation capability: one prompt in, one completion out.
///
/// Implementations are stateless between calls and must be safe to share
/// across concurrent segmentation runs.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Produce a completion for the prompt.
    ///
    /// Transient transport failures are retried inside the implementation;
    /// a returned error means the retry budget is exhausted or the failure
    /// is permanent.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Stable model identifier, part of every cache key.
    fn model_id(&self) -> &str;
}

/// Connection settings for the live oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Requests per minute through the shared gate.
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// In-flight call cap.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_rpm() -> u32 {
    60
}
fn default_max_in_flight() -> usize {
    5
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for OracleConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default oracle config deserializes")
    }
}
