//! Pattern-free boundary candidate generation.
//!
//! Scores every line on structural cues alone: length, surrounding blank
//! lines, punctuation shape, marker and time/place lexemes, and dialogue
//! penalties. No chapter numbering or bracket convention is assumed.

use chaptersmith_core::SegmentConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::boundary::{BoundarySource, Candidate};
use crate::source::SourceFile;

/// Trimmed lines at or under this many code points can be titles.
const SHORT_LINE_LIMIT: usize = 60;
const VERY_SHORT_LIMIT: usize = 30;
/// Lines over this length are body prose.
const LONG_LINE_LIMIT: usize = 200;
/// Short exclamations up to this length read as dialogue.
const MAX_DIALOGUE_LEN: usize = 40;
/// Candidates below this score are noise.
const CONFIDENCE_FLOOR: f32 = 0.3;
/// Minimum line distance between kept candidates.
const MIN_LINES_BETWEEN: usize = 10;

/// Characters that open a bracketed title.
const TITLE_OPENERS: &[char] = &['{', '[', '<', '【', '('];

static CHAPTER_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[第章]",
        r"^\s*[IVX]+\.",
        r"(?i)^\s*Chapter",
        r"(?i)^\s*Part\s+\d+",
        r"^\s*===+",
        r"^\s*---+",
        r"^\s*\*\*\*+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("indicator pattern compiles"))
    .collect()
});

static TIME_PLACE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\s*\d{4}년",
        r"^\s*\d+월\s*\d+일",
        r"^\s*[一二三四五六七八九十]+年",
        r"(?i)^\s*\[.*?(?:년|월|일|time|place|location)\]",
        r"^\s*(?:서울|도쿄|뉴욕|런던|파리)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("time/place pattern compiles"))
    .collect()
});

static DIALOGUE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^["'「『“].+["'」』”]$"#).expect("dialogue pattern compiles"));

static SENTENCE_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.。다요죠습]$").expect("sentence tail pattern compiles"));

static PUNCT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]$").expect("punct pattern compiles"));

pub struct StructuralAnalyzer<'a> {
    config: &'a SegmentConfig,
}

impl<'a> StructuralAnalyzer<'a> {
    pub fn new(config: &'a SegmentConfig) -> Self {
        Self { config }
    }

    /// Generate scored boundary candidates, capped at
    /// `structural_fanout × expected` and spaced at least
    /// `MIN_LINES_BETWEEN` lines apart.
    pub fn generate_candidates(&self, source: &SourceFile, expected: usize) -> Vec<Candidate> {
        let cap = self.config.structural_fanout * expected.max(1);
        let mut raw: Vec<Candidate> = Vec::new();
        let mut blank_run = 0usize;

        for (i, line) in source.lines.iter().enumerate() {
            let trimmed = line.text.trim();

            // The very first line is the book title, not a chapter.
            if i == 0 {
                continue;
            }
            if trimmed.is_empty() {
                blank_run += 1;
                continue;
            }

            let score = self.score_line(trimmed, i, source, blank_run);
            blank_run = 0;

            if score > CONFIDENCE_FLOOR {
                raw.push(Candidate {
                    line_num: i,
                    byte_offset: line.byte_offset,
                    text: trimmed.to_string(),
                    structural: score,
                    ai: None,
                    source: BoundarySource::Structural,
                });
                if raw.len() >= cap * 2 {
                    break;
                }
            }
        }

        // Enforce minimum line distance, keeping earlier candidates.
        let mut filtered: Vec<Candidate> = Vec::new();
        let mut last_line: isize = -(MIN_LINES_BETWEEN as isize);
        for candidate in raw.iter() {
            if candidate.line_num as isize - last_line >= MIN_LINES_BETWEEN as isize {
                last_line = candidate.line_num as isize;
                filtered.push(candidate.clone());
                if filtered.len() >= cap {
                    break;
                }
            }
        }

        info!(
            "Structural analysis: {} candidates (from {} raw, cap {})",
            filtered.len(),
            raw.len(),
            cap
        );
        filtered
    }

    fn score_line(
        &self,
        line: &str,
        line_num: usize,
        source: &SourceFile,
        blanks_before: usize,
    ) -> f32 {
        let len = line.chars().count();
        let mut score: f32 = 0.0;

        if len <= SHORT_LINE_LIMIT {
            score += 0.3;
        }
        if len < VERY_SHORT_LIMIT {
            score += 0.2;
        }
        if blanks_before >= 1 {
            score += 0.2;
        }
        if blanks_before >= 2 {
            score += 0.1;
        }

        if CHAPTER_INDICATORS.iter().any(|p| p.is_match(line)) {
            score += 0.4;
        }
        if line.chars().any(|c| c.is_ascii_digit()) {
            score += 0.15;
        }
        if line.starts_with(TITLE_OPENERS) {
            score += 0.1;
        }
        if !PUNCT_END.is_match(line) {
            score += 0.1;
        }
        if TIME_PLACE_MARKERS.iter().any(|p| p.is_match(line)) {
            score += 0.2;
        }

        // Context: titles are short lines followed by longer prose,
        // often after a long closing line.
        if let Some(next) = source.lines.get(line_num + 1) {
            let next_trimmed = next.text.trim();
            if !next_trimmed.is_empty() && next_trimmed.chars().count() * 2 > len * 3 {
                score += 0.15;
            }
        }
        if let Some(prev) = source.lines.get(line_num.wrapping_sub(1)) {
            if prev.text.trim().chars().count() > LONG_LINE_LIMIT {
                score += 0.1;
            }
        }

        let word_count = line.split_whitespace().count();
        if line == line.to_uppercase()
            && line.chars().any(|c| c.is_ascii_alphabetic())
            && (5..15).contains(&word_count)
        {
            score += 0.15;
        }

        // Penalties: quoted dialogue, short exclamations, and prose
        // sentence tails are emphatically not titles.
        let is_exclamation =
            len <= MAX_DIALOGUE_LEN && line.ends_with(['?', '!', '？', '！']);
        if DIALOGUE_QUOTED.is_match(line) || is_exclamation {
            score -= 0.5;
        }
        if SENTENCE_TAIL.is_match(line) {
            score -= 0.3;
        }

        score.clamp(0.0, 1.0)
    }
}
