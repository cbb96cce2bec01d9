//! AI likelihood scoring for boundary candidates.
//!
//! Each candidate is judged in context: five non-blank lines on each side.
//! Candidates are batched per prompt to bound call volume, and anything the
//! oracle fails to score keeps a neutral 0.5.

use std::sync::Arc;

use chaptersmith_core::SegmentConfig;
use chaptersmith_oracle::TextOracle;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::boundary::Candidate;
use crate::source::SourceFile;

const NEUTRAL_SCORE: f32 = 0.5;

static SCORE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d+)\s*[:.]\s*([01](?:\.\d+)?)").expect("score line pattern compiles")
});

pub struct AiScorer<'a> {
    oracle: Arc<dyn TextOracle>,
    config: &'a SegmentConfig,
}

impl<'a> AiScorer<'a> {
    pub fn new(oracle: Arc<dyn TextOracle>, config: &'a SegmentConfig) -> Self {
        Self { oracle, config }
    }

    /// Score every candidate in place. Past the hard cap the scorer steps
    /// aside entirely and the structural scores stand alone.
    pub async fn score(&self, source: &SourceFile, candidates: &mut [Candidate]) {
        if candidates.is_empty() {
            return;
        }
        if candidates.len() > self.config.scorer_hard_cap {
            warn!(
                "Skipping AI scoring: {} candidates exceed the cap of {}",
                candidates.len(),
                self.config.scorer_hard_cap
            );
            return;
        }

        let total = candidates.len();
        let batch_size = self.config.scorer_batch_size.max(1);
        info!("AI scoring {total} candidates in batches of {batch_size}");

        for batch in candidates.chunks_mut(batch_size) {
            let prompt = self.batch_prompt(source, batch);
            match self.oracle.complete(&prompt).await {
                Ok(response) => apply_batch_scores(batch, &response),
                Err(e) => {
                    warn!("Scoring batch failed ({e}); using neutral scores");
                    for candidate in batch.iter_mut() {
                        candidate.ai = Some(NEUTRAL_SCORE);
                    }
                }
            }
        }
    }

    fn batch_prompt(&self, source: &SourceFile, batch: &[Candidate]) -> String {
        let mut entries = String::new();
        for (i, candidate) in batch.iter().enumerate() {
            let (before, after) = self.context_of(source, candidate.line_num);
            entries.push_str(&format!(
                "--- Candidate {} ---\n[Before]\n{before}\n[LINE]\n>>> {} <<<\n[After]\n{after}\n\n",
                i + 1,
                candidate.text
            ));
        }

        format!(
            "=== chapter_title_likelihood ===\n\
             You are an expert in analyzing novel structures.\n\
             \n\
             [Task]\n\
             For each candidate below, judge whether the marked LINE is a chapter \
             title/boundary. Score 0.0 to 1.0:\n\
             - 1.0 = definitely a chapter title\n\
             - 0.5 = possibly a chapter title\n\
             - 0.0 = definitely not (dialogue and mid-sentence lines are not titles)\n\
             \n\
             {entries}\
             [Output]\n\
             One line per candidate, `index: score` (e.g. `1: 0.8`). Nothing else.",
        )
    }

    /// Up to `scorer_context_lines` non-blank lines on each side.
    fn context_of(&self, source: &SourceFile, line_num: usize) -> (String, String) {
        let n = self.config.scorer_context_lines;

        let before: Vec<&str> = source.lines[..line_num]
            .iter()
            .rev()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .take(n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let after: Vec<&str> = source
            .lines
            .get(line_num + 1..)
            .unwrap_or(&[])
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .take(n)
            .collect();

        (before.join("\n"), after.join("\n"))
    }
}

/// Parse `index: score` lines; anything missing or out of range degrades
/// to the neutral score with a warning.
fn apply_batch_scores(batch: &mut [Candidate], response: &str) {
    let mut parsed: Vec<Option<f32>> = vec![None; batch.len()];
    for captures in SCORE_LINE.captures_iter(response) {
        let index: usize = match captures[1].parse() {
            Ok(i) => i,
            Err(_) => continue,
        };
        let score: f32 = match captures[2].parse() {
            Ok(s) => s,
            Err(_) => continue,
        };
        if index >= 1 && index <= batch.len() {
            parsed[index - 1] = Some(score.clamp(0.0, 1.0));
        }
    }

    for (candidate, score) in batch.iter_mut().zip(parsed) {
        match score {
            Some(score) => candidate.ai = Some(score),
            None => {
                warn!(
                    "No parseable score for candidate at line {}; keeping neutral",
                    candidate.line_num
                );
                candidate.ai = Some(NEUTRAL_SCORE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundarySource;
    use chaptersmith_oracle::ScriptedOracle;
    use std::path::Path;

    fn candidate(line_num: usize, text: &str) -> Candidate {
        Candidate {
            line_num,
            byte_offset: line_num as u64 * 100,
            text: text.into(),
            structural: 0.6,
            ai: None,
            source: BoundarySource::Structural,
        }
    }

    fn fixture() -> SourceFile {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("{i}번째 줄의 본문입니다\n"));
        }
        SourceFile::from_bytes(text.as_bytes(), Path::new("f.txt")).unwrap()
    }

    #[test]
    fn test_apply_batch_scores() {
        let mut batch = vec![candidate(5, "a"), candidate(15, "b"), candidate(25, "c")];
        apply_batch_scores(&mut batch, "1: 0.9\n2: 0.2\ngarbage\n");

        assert_eq!(batch[0].ai, Some(0.9));
        assert_eq!(batch[1].ai, Some(0.2));
        // Missing entry degrades to neutral
        assert_eq!(batch[2].ai, Some(NEUTRAL_SCORE));
    }

    #[test]
    fn test_out_of_range_scores_clamped() {
        let mut batch = vec![candidate(5, "a")];
        apply_batch_scores(&mut batch, "1: 1.0");
        assert_eq!(batch[0].ai, Some(1.0));
    }

    #[tokio::test]
    async fn test_scoring_with_scripted_oracle() {
        let config = SegmentConfig::default();
        let oracle = Arc::new(
            ScriptedOracle::new().rule("chapter_title_likelihood", "1: 0.8\n2: 0.1"),
        );
        let scorer = AiScorer::new(oracle, &config);
        let source = fixture();

        let mut candidates = vec![candidate(5, "다섯째 줄"), candidate(20, "스무째 줄")];
        scorer.score(&source, &mut candidates).await;

        assert_eq!(candidates[0].ai, Some(0.8));
        assert_eq!(candidates[1].ai, Some(0.1));
    }

    #[tokio::test]
    async fn test_hard_cap_skips_scoring() {
        let mut config = SegmentConfig::default();
        config.scorer_hard_cap = 3;
        let oracle = Arc::new(ScriptedOracle::new());
        let scorer = AiScorer::new(oracle, &config);
        let source = fixture();

        let mut candidates: Vec<Candidate> =
            (0..5).map(|i| candidate(i * 7, "줄")).collect();
        scorer.score(&source, &mut candidates).await;

        assert!(candidates.iter().all(|c| c.ai.is_none()));
    }
}
