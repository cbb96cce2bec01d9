//! Deterministic oracles for tests and dry runs.
//!
//! `ScriptedOracle` answers prompts by substring rules; `FailingOracle`
//! simulates a provider outage. Both keep engine tests fully offline.

use std::collections::VecDeque;

use async_trait::async_trait;
use chaptersmith_core::{Error, Result};
use parking_lot::Mutex;

use crate::oracle::TextOracle;

enum Reply {
    Fixed(String),
    Sequence(Mutex<VecDeque<String>>),
}

/// Answers each prompt with the first rule whose needle appears in it.
///
/// Prompts are tagged with stable headers (`=== chapter_pattern_analysis
/// ===` and friends), so rules usually key on those.
pub struct ScriptedOracle {
    rules: Vec<(String, Reply)>,
    fallback: String,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: "NO_RESPONSE".into(),
        }
    }

    /// Always answer prompts containing `needle` with `reply`.
    pub fn rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules
            .push((needle.into(), Reply::Fixed(reply.into())));
        self
    }

    /// Answer successive prompts containing `needle` with each reply in
    /// turn; once exhausted, the last reply repeats.
    pub fn rule_sequence<I, S>(mut self, needle: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = replies.into_iter().map(Into::into).collect();
        self.rules
            .push((needle.into(), Reply::Sequence(Mutex::new(queue))));
        self
    }

    /// Reply for prompts no rule covers (default `NO_RESPONSE`).
    pub fn fallback(mut self, reply: &str) -> Self {
        self.fallback = reply.into();
        self
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextOracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        for (needle, reply) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(match reply {
                    Reply::Fixed(text) => text.clone(),
                    Reply::Sequence(queue) => {
                        let mut queue = queue.lock();
                        if queue.len() > 1 {
                            queue.pop_front().unwrap_or_default()
                        } else {
                            queue.front().cloned().unwrap_or_default()
                        }
                    }
                });
            }
        }
        Ok(self.fallback.clone())
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Every call fails as if the provider were down.
pub struct FailingOracle;

#[async_trait]
impl TextOracle for FailingOracle {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::OracleUnavailable("scripted outage".into()))
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}
