//! Semantic topic-change detection.
//!
//! The fallback candidate source when structural cues under-cover the
//! file: adjacent sliding windows are compared by the oracle, and score
//! peaks become boundary candidates anchored to the nearest paragraph
//! break.

use std::sync::Arc;

use chaptersmith_core::SegmentConfig;
use chaptersmith_oracle::TextOracle;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::boundary::{BoundarySource, Candidate};
use crate::source::SourceFile;

/// Candidates within this many bytes of an existing one are redundant.
const OVERLAP_BYTES: u64 = 5_000;
/// Prompt excerpt cap per side, in code points.
const EXCERPT_CHARS: usize = 1000;

static SCORE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0?\.\d+|1\.0|[01]").expect("score token pattern compiles"));

/// A window of consecutive lines totalling about the configured byte size.
struct LineWindow {
    start_line: usize,
    end_line: usize,
    start_byte: u64,
}

pub struct TopicChangeDetector<'a> {
    oracle: Arc<dyn TextOracle>,
    config: &'a SegmentConfig,
}

impl<'a> TopicChangeDetector<'a> {
    pub fn new(oracle: Arc<dyn TextOracle>, config: &'a SegmentConfig) -> Self {
        Self { oracle, config }
    }

    /// Detect topic-change boundaries between adjacent windows. Bounded by
    /// the per-file call budget; windows overlapping existing candidates
    /// are skipped.
    pub async fn detect(
        &self,
        source: &SourceFile,
        expected: usize,
        existing: &[Candidate],
    ) -> Vec<Candidate> {
        let windows = self.build_windows(source);
        if windows.len() < 2 {
            return Vec::new();
        }

        // Coverage only needs a few windows per expected chapter; the
        // absolute budget bounds the worst case.
        let call_limit = (expected * 3)
            .min(self.config.topic_call_budget)
            .min(windows.len() - 1);

        // Spread the budget across the file instead of clustering at the
        // head.
        let step = ((windows.len() - 1) / call_limit.max(1)).max(1);

        info!(
            "Topic detection: {} windows, {} calls budgeted",
            windows.len(),
            call_limit
        );

        let existing_offsets: Vec<u64> = existing.iter().map(|c| c.byte_offset).collect();
        let mut candidates = Vec::new();
        let mut calls = 0usize;

        let mut i = step.max(1);
        while i < windows.len() && calls < call_limit {
            let window = &windows[i];
            let previous = &windows[i - 1];
            i += step;

            if existing_offsets
                .iter()
                .any(|off| off.abs_diff(window.start_byte) < OVERLAP_BYTES)
            {
                continue;
            }

            calls += 1;
            let score = self
                .change_score(source, previous, window)
                .await
                .unwrap_or(0.5);

            if score > self.config.topic_change_threshold as f32 {
                let anchor = self.anchor_line(source, window);
                let line = &source.lines[anchor];
                let text = line.text.trim();
                if text.is_empty() {
                    continue;
                }
                candidates.push(Candidate {
                    line_num: anchor,
                    byte_offset: line.byte_offset,
                    text: text.to_string(),
                    structural: score,
                    ai: Some(score),
                    source: BoundarySource::Topic,
                });
            }
        }

        info!("Topic detection: {} boundaries found", candidates.len());
        candidates
    }

    fn build_windows(&self, source: &SourceFile) -> Vec<LineWindow> {
        let window_bytes = self.config.topic_window_bytes.max(256) as u64;
        let stride = window_bytes / 2;

        let mut windows = Vec::new();
        let mut target: u64 = 0;
        while target < source.raw_len {
            let start_line = source.line_index_at(target);
            let start_byte = source.lines[start_line].byte_offset;

            let mut end_line = start_line;
            while end_line + 1 < source.line_count()
                && source.lines[end_line + 1].byte_offset - start_byte < window_bytes
            {
                end_line += 1;
            }

            windows.push(LineWindow {
                start_line,
                end_line,
                start_byte,
            });
            target += stride;
            if end_line + 1 >= source.line_count() {
                break;
            }
        }
        windows
    }

    async fn change_score(
        &self,
        source: &SourceFile,
        previous: &LineWindow,
        current: &LineWindow,
    ) -> Option<f32> {
        let tail = window_text(source, previous);
        let head = window_text(source, current);
        let prompt = topic_prompt(
            tail_chars(&tail, EXCERPT_CHARS),
            head_chars(&head, EXCERPT_CHARS),
        );

        match self.oracle.complete(&prompt).await {
            Ok(response) => {
                let token = SCORE_TOKEN.find(response.trim())?;
                token.as_str().parse::<f32>().ok().map(|s| s.clamp(0.0, 1.0))
            }
            Err(e) => {
                warn!("Topic change call failed: {e}");
                None
            }
        }
    }

    /// The best boundary inside a window: the line after the first blank
    /// (paragraph break), else the first short line, else the window start.
    fn anchor_line(&self, source: &SourceFile, window: &LineWindow) -> usize {
        let range = window.start_line..=window.end_line;
        let mut after_blank: Option<usize> = None;
        for i in range.clone() {
            if source.lines[i].text.trim().is_empty() {
                if let Some(next) = find_non_blank(source, i + 1, window.end_line) {
                    after_blank = Some(next);
                    break;
                }
            }
        }
        if let Some(line) = after_blank {
            return line;
        }
        for i in range {
            let trimmed = source.lines[i].text.trim();
            if !trimmed.is_empty() && trimmed.chars().count() < 50 && i > window.start_line {
                return i;
            }
        }
        find_non_blank(source, window.start_line, window.end_line).unwrap_or(window.start_line)
    }
}

fn find_non_blank(source: &SourceFile, from: usize, to: usize) -> Option<usize> {
    (from..=to.min(source.line_count().saturating_sub(1)))
        .find(|&i| !source.lines[i].text.trim().is_empty())
}

fn window_text(source: &SourceFile, window: &LineWindow) -> String {
    source.lines[window.start_line..=window.end_line]
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn topic_prompt(previous: &str, current: &str) -> String {
    format!(
        "=== topic_change_detection ===\n\
         You are an expert in analyzing narrative structure.\n\
         \n\
         [Task]\n\
         Score 0.0 to 1.0 whether a significant topic or scene change occurs \
         between TEXT A and TEXT B:\n\
         - 1.0 = clear change (new chapter likely)\n\
         - 0.5 = moderate transition\n\
         - 0.0 = same scene continues\n\
         \n\
         [TEXT A - previous]\n{previous}\n\
         \n\
         [TEXT B - current]\n{current}\n\
         \n\
         Change indicators: new location, new time period, new character \
         focus, new plot thread, scene break, perspective change.\n\
         Return ONLY the numeric score.",
    )
}
