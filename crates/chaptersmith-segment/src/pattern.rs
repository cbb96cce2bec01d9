//! Pattern acquisition and repair.
//!
//! Owns every oracle interaction that produces, repairs, or augments the
//! chapter-header regex. Oracle output is never trusted: each proposal
//! passes static checks, must compile, and must demonstrably match the
//! file before it replaces the working pattern.

use std::collections::HashSet;
use std::sync::Arc;

use chaptersmith_core::{Error, Result, SegmentConfig};
use chaptersmith_oracle::TextOracle;
use tracing::{debug, info, warn};

use crate::sampler;
use crate::source::SourceFile;
use crate::splitter::{self, PatternMatch};

/// Deterministic universal fallback: serialized Korean novels are
/// overwhelmingly numbered `N화`.
pub const UNIVERSAL_FALLBACK: &str = r"\d+\s*화";

/// Fallback coverage required before the universal pattern is adopted.
const FALLBACK_COVERAGE: f64 = 0.9;

/// Oracle attempts for the initial pattern.
const ANALYZE_ATTEMPTS: u32 = 3;

/// Per-call sample text limit for the direct title search.
const DIRECT_SEARCH_CHUNK_BYTES: usize = 20 * 1024;

/// Same-prompt repetitions for consensus voting.
const CONSENSUS_RUNS: usize = 3;
const CONSENSUS_QUORUM: usize = 2;

/// Outcome of deterministic auto-validation.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub pattern: String,
    /// Whether dropping close-duplicate matches moves the count toward the
    /// expected count; the runner then applies the duplicate policy at
    /// split time.
    pub drop_close_duplicates: bool,
    pub actions: Vec<String>,
}

pub struct PatternManager<'a> {
    oracle: Arc<dyn TextOracle>,
    config: &'a SegmentConfig,
    end_markers: Vec<String>,
}

impl<'a> PatternManager<'a> {
    pub fn new(
        oracle: Arc<dyn TextOracle>,
        config: &'a SegmentConfig,
        extra_end_markers: &[String],
    ) -> Self {
        let mut end_markers = config.end_markers.clone();
        for marker in extra_end_markers {
            if !end_markers.contains(marker) {
                end_markers.push(marker.clone());
            }
        }
        Self {
            oracle,
            config,
            end_markers,
        }
    }

    // ---- initial acquisition -------------------------------------------

    /// Infer the chapter-header pattern from head/middle/tail samples.
    pub async fn analyze(&self, source: &SourceFile, expected: usize) -> Result<String> {
        let samples = sampler::head_middle_tail(source, self.config.sample_window_bytes);
        let sample_text = samples.joined();

        let mut last_reason = String::new();
        for attempt in 0..ANALYZE_ATTEMPTS {
            let prompt = analysis_prompt(&sample_text, expected, attempt, &self.end_markers);
            let response = self.oracle.complete(&prompt).await?;
            let candidate = extract_pattern_text(&response);

            match self.validate_pattern(source, &candidate) {
                Ok(count) => {
                    info!(
                        "Initial pattern accepted on attempt {}: '{}' ({} matches)",
                        attempt + 1,
                        candidate,
                        count
                    );
                    return Ok(candidate);
                }
                Err(e) => {
                    last_reason = e.to_string();
                    debug!("Pattern attempt {} rejected: {}", attempt + 1, last_reason);
                }
            }
        }

        if let Some(fallback) = self.universal_fallback(source) {
            info!("Falling back to universal pattern '{fallback}'");
            return Ok(fallback);
        }

        Err(Error::PatternUnusable(format!(
            "{ANALYZE_ATTEMPTS} attempts produced no valid pattern: {last_reason}"
        )))
    }

    /// The deterministic Plan B: adopt the universal numbered pattern when
    /// it covers most of the file.
    pub fn universal_fallback(&self, source: &SourceFile) -> Option<String> {
        let stats = splitter::verify_coverage(source, UNIVERSAL_FALLBACK).ok()?;
        if stats.match_count > 0 && stats.last_match_ratio > FALLBACK_COVERAGE {
            Some(UNIVERSAL_FALLBACK.to_string())
        } else {
            None
        }
    }

    /// Full acceptance check for an oracle-proposed pattern. Returns the
    /// number of non-end-marker matching lines.
    pub fn validate_pattern(&self, source: &SourceFile, pattern: &str) -> Result<usize> {
        static_checks(pattern)?;
        let matches = splitter::match_positions(source, pattern)?;
        let usable = matches
            .iter()
            .filter(|m| !self.is_end_marker_line(&m.text))
            .count();
        if usable == 0 {
            return Err(Error::PatternUnusable(format!(
                "'{pattern}' matches no chapter-title lines"
            )));
        }
        Ok(usable)
    }

    /// Whether a line's non-whitespace tail is an end-of-chapter marker.
    pub fn is_end_marker_line(&self, line: &str) -> bool {
        let trimmed = line.trim_end();
        self.end_markers
            .iter()
            .any(|marker| trimmed.ends_with(marker.as_str()))
    }

    // ---- deterministic auto-validation ---------------------------------

    /// Repair the pattern without oracle calls: end-marker exclusion,
    /// close-duplicate detection, number-optional relaxation. Each step is
    /// kept only if it moves the match count toward `expected`.
    pub fn auto_validate(
        &self,
        source: &SourceFile,
        pattern: &str,
        expected: usize,
    ) -> RepairOutcome {
        let mut best = pattern.to_string();
        let mut best_count = raw_count(source, &best).unwrap_or(0);
        let mut actions = Vec::new();

        let distance = |count: usize| count.abs_diff(expected);

        // End-marker exclusion
        let excluded = self.add_end_marker_exclusion(&best);
        if let Some(count) = raw_count(source, &excluded) {
            if count > 0 && distance(count) < distance(best_count) {
                debug!("End-marker exclusion: {best_count} -> {count} matches");
                actions.push(format!("end-marker-filter {best_count}->{count}"));
                best = excluded;
                best_count = count;
            }
        }

        // Close-duplicate filtering (applied to matches, not the pattern)
        let mut drop_duplicates = false;
        if let Ok(matches) = splitter::match_positions(source, &best) {
            let deduped = splitter::drop_close_duplicates(&matches, self.config.min_pair_gap);
            if deduped.len() != matches.len() && distance(deduped.len()) < distance(best_count) {
                debug!(
                    "Close-duplicate filter: {} -> {} matches",
                    matches.len(),
                    deduped.len()
                );
                actions.push(format!(
                    "close-duplicate-filter {}->{}",
                    matches.len(),
                    deduped.len()
                ));
                drop_duplicates = true;
                best_count = deduped.len();
            }
        }

        // Number-optional relaxation, most aggressive variant first
        let digits_optional = best.replace(r"\d+", r"\d*");
        let parens_optional = make_paren_groups_optional(&best);
        let both = make_paren_groups_optional(&digits_optional);
        for (name, variant) in [
            ("relax-both", both),
            ("relax-parens", parens_optional),
            ("relax-digits", digits_optional),
        ] {
            if variant == best {
                continue;
            }
            if let Some(count) = raw_count(source, &variant) {
                if count > 0
                    && distance(count) < distance(best_count)
                    && !self.introduces_end_matches(source, &best, &variant)
                {
                    debug!("{name}: {best_count} -> {count} matches");
                    actions.push(format!("{name} {best_count}->{count}"));
                    best = variant;
                    best_count = count;
                    break;
                }
            }
        }

        RepairOutcome {
            pattern: best,
            drop_close_duplicates: drop_duplicates,
            actions,
        }
    }

    /// Wrap the pattern so lines whose tail is an end marker no longer
    /// match.
    pub fn add_end_marker_exclusion(&self, pattern: &str) -> String {
        let alternatives = self
            .end_markers
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        format!(r"(?:{pattern})(?!\s*(?:{alternatives})\s*$)")
    }

    fn introduces_end_matches(
        &self,
        source: &SourceFile,
        before: &str,
        after: &str,
    ) -> bool {
        let count_end = |pattern: &str| {
            splitter::match_positions(source, pattern)
                .map(|ms| {
                    ms.iter()
                        .filter(|m| self.is_end_marker_line(&m.text))
                        .count()
                })
                .unwrap_or(usize::MAX)
        };
        count_end(after) > count_end(before)
    }

    // ---- gap-directed refinement ---------------------------------------

    /// Refine the pattern by sampling dynamic gaps and consulting the
    /// oracle. Returns the best pattern and the trailing run of rejected
    /// proposals.
    pub async fn refine(
        &self,
        source: &SourceFile,
        pattern: &str,
        expected: usize,
    ) -> Result<(String, u32)> {
        let matches = splitter::match_positions(source, pattern)?;
        let gaps = dynamic_gaps(source, &matches, expected);

        let mut best = pattern.to_string();
        let mut best_count = matches.len();
        let mut trailing_rejections: u32 = 0;

        for gap in gaps.iter().take(self.config.max_gaps_to_analyze) {
            let window = sampler::extract_around(
                source,
                gap.start + (gap.end - gap.start) / 2,
                ((gap.end - gap.start) / 2).min(15_000),
            );
            let prompt = gap_prompt(&window.text, &best, expected, &self.end_markers);
            let response = self.oracle.complete(&prompt).await?;

            let accepted = self
                .try_gap_proposal(source, &best, best_count, expected, &response)
                .map(|(pattern, count)| {
                    info!("Gap proposal accepted: {best_count} -> {count} matches");
                    best = pattern;
                    best_count = count;
                })
                .is_some();

            if accepted {
                trailing_rejections = 0;
            } else {
                trailing_rejections += 1;
                debug!("Gap proposal rejected (streak {trailing_rejections})");
            }
        }

        Ok((best, trailing_rejections))
    }

    /// Evaluate one gap response: either a broader pattern or explicit
    /// title lines. Accepted only if the combined pattern strictly
    /// increases the match count without exceeding `expected`.
    fn try_gap_proposal(
        &self,
        source: &SourceFile,
        current: &str,
        current_count: usize,
        expected: usize,
        response: &str,
    ) -> Option<(String, usize)> {
        let proposal = if let Some(pattern_line) = tagged_line(response, "PATTERN:") {
            let candidate = extract_pattern_text(&pattern_line);
            static_checks(&candidate).ok()?;
            candidate
        } else if let Some(titles) = self.titles_in_file(source, &parse_title_lines(response)) {
            let escaped = titles
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            format!("^(?:{escaped})$")
        } else {
            return None;
        };

        let combined = format!("{current}|{proposal}");
        let count = raw_count(source, &combined)?;
        if count > current_count
            && count <= expected
            && !self.introduces_end_matches(source, current, &combined)
        {
            Some((combined, count))
        } else {
            None
        }
    }

    fn titles_in_file(&self, source: &SourceFile, titles: &[String]) -> Option<Vec<String>> {
        let file_lines: HashSet<&str> = source.lines.iter().map(|l| l.text.trim()).collect();
        let present: Vec<String> = titles
            .iter()
            .filter(|t| file_lines.contains(t.as_str()) && !self.is_end_marker_line(t))
            .cloned()
            .collect();
        if present.is_empty() {
            None
        } else {
            Some(present)
        }
    }

    // ---- direct title search -------------------------------------------

    /// Enumerate chapter-title lines across the whole file with the oracle,
    /// using existing matches as few-shot examples. Only titles that occur
    /// verbatim in the file survive.
    pub async fn direct_title_search(
        &self,
        source: &SourceFile,
        expected: usize,
        existing: &[PatternMatch],
    ) -> Result<Vec<String>> {
        let windows = sampler::uniform_samples(
            source,
            self.config.uniform_sample_count,
            self.config.sample_window_bytes,
        );

        let examples: Vec<&str> = existing.iter().take(5).map(|m| m.text.as_str()).collect();

        let mut found: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut chunk = String::new();
        let mut chunks: Vec<String> = Vec::new();
        for window in &windows {
            if !chunk.is_empty() && chunk.len() + window.text.len() > DIRECT_SEARCH_CHUNK_BYTES {
                chunks.push(std::mem::take(&mut chunk));
            }
            if !chunk.is_empty() {
                chunk.push_str("\n\n");
                chunk.push_str(sampler::SAMPLE_SKIP_MARKER);
                chunk.push_str("\n\n");
            }
            chunk.push_str(&window.text);
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        for chunk in &chunks {
            let prompt = direct_search_prompt(chunk, expected, &examples);
            let response = match self.oracle.complete(&prompt).await {
                Ok(r) => r,
                Err(Error::OracleUnavailable(msg)) => {
                    return Err(Error::OracleUnavailable(msg))
                }
                Err(e) => {
                    warn!("Direct search chunk failed: {e}");
                    continue;
                }
            };

            for title in parse_title_lines(&response) {
                if !self.is_end_marker_line(&title) && seen.insert(title.clone()) {
                    found.push(title);
                }
            }
        }

        let verified = self.titles_in_file(source, &found).unwrap_or_default();
        info!(
            "Direct title search: {} raw, {} verified in file",
            found.len(),
            verified.len()
        );
        Ok(verified)
    }

    /// Ask the oracle for one regex matching all supplied titles.
    pub async fn pattern_from_examples(
        &self,
        source: &SourceFile,
        titles: &[String],
    ) -> Result<Option<String>> {
        if titles.is_empty() {
            return Ok(None);
        }
        let prompt = reverse_pattern_prompt(titles, &self.end_markers);
        let response = self.oracle.complete(&prompt).await?;
        let candidate = extract_pattern_text(&response);

        match self.validate_pattern(source, &candidate) {
            Ok(count) => {
                info!("Reverse pattern '{candidate}' matches {count} lines");
                Ok(Some(candidate))
            }
            Err(e) => {
                warn!("Reverse pattern rejected: {e}");
                Ok(None)
            }
        }
    }

    // ---- consensus voting ----------------------------------------------

    /// Issue the same extraction prompt several times and keep only lines
    /// present in a quorum of responses.
    pub async fn consensus_titles(&self, prompt: &str) -> Result<Vec<String>> {
        let mut tallies: Vec<(String, usize)> = Vec::new();

        for _ in 0..CONSENSUS_RUNS {
            let response = self.oracle.complete(prompt).await?;
            let mut in_this_run: HashSet<String> = HashSet::new();
            for line in parse_title_lines(&response) {
                if !in_this_run.insert(line.clone()) {
                    continue;
                }
                match tallies.iter_mut().find(|(t, _)| *t == line) {
                    Some((_, count)) => *count += 1,
                    None => tallies.push((line, 1)),
                }
            }
        }

        Ok(tallies
            .into_iter()
            .filter(|(_, count)| *count >= CONSENSUS_QUORUM)
            .map(|(title, _)| title)
            .collect())
    }

    /// Mine a gap sample for explicit title-candidate lines, suppressing
    /// oracle variance through consensus.
    pub async fn extract_title_candidates(
        &self,
        source: &SourceFile,
        gap_sample: &str,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let prompt = candidate_extraction_prompt(gap_sample, pattern);
        let voted = self.consensus_titles(&prompt).await?;
        Ok(self.titles_in_file(source, &voted).unwrap_or_default())
    }
}

// ---- deterministic helpers ---------------------------------------------

/// Raw match count: every matching line becomes a split boundary, so this
/// is the chapter count a pattern would produce.
fn raw_count(source: &SourceFile, pattern: &str) -> Option<usize> {
    splitter::match_positions(source, pattern)
        .ok()
        .map(|m| m.len())
}

/// A span of the file unexpectedly empty of matches.
#[derive(Debug, Clone, Copy)]
pub struct Gap {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

/// Adjacent match pairs (plus the head and tail spans) whose distance
/// exceeds `max(avg_chapter_bytes * 1.5, 50_000)`, largest first.
pub fn dynamic_gaps(source: &SourceFile, matches: &[PatternMatch], expected: usize) -> Vec<Gap> {
    let avg = if expected > 0 {
        source.raw_len / expected as u64
    } else {
        source.raw_len
    };
    let threshold = (avg + avg / 2).max(50_000);

    let mut gaps = Vec::new();
    if matches.is_empty() {
        gaps.push(Gap {
            start: 0,
            end: source.raw_len,
            size: source.raw_len,
        });
        return gaps;
    }

    if matches[0].byte_offset > threshold {
        gaps.push(Gap {
            start: 0,
            end: matches[0].byte_offset,
            size: matches[0].byte_offset,
        });
    }
    for pair in matches.windows(2) {
        let size = pair[1].byte_offset - pair[0].byte_offset;
        if size > threshold {
            gaps.push(Gap {
                start: pair[0].byte_offset,
                end: pair[1].byte_offset,
                size,
            });
        }
    }
    let tail = source.raw_len - matches[matches.len() - 1].byte_offset;
    if tail > threshold {
        gaps.push(Gap {
            start: matches[matches.len() - 1].byte_offset,
            end: source.raw_len,
            size: tail,
        });
    }

    gaps.sort_by(|a, b| b.size.cmp(&a.size));
    gaps
}

/// Static shape checks on a proposed pattern: non-empty, no leading
/// repetition metacharacter, balanced unescaped parentheses, compiles.
pub fn static_checks(pattern: &str) -> chaptersmith_core::Result<()> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(Error::PatternUnusable("empty pattern".into()));
    }
    if matches!(trimmed.chars().next(), Some('*' | '+' | '?' | '{')) {
        return Err(Error::PatternUnusable(format!(
            "'{trimmed}' begins with a repetition metacharacter"
        )));
    }
    if !parens_balanced(trimmed) {
        return Err(Error::PatternUnusable(format!(
            "'{trimmed}' has unbalanced parentheses"
        )));
    }
    splitter::compile(trimmed).map(|_| ())
}

fn parens_balanced(pattern: &str) -> bool {
    let mut depth: i32 = 0;
    let mut escaped = false;
    let mut in_class = false;

    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_class
}

/// Wrap escaped-parenthesis groups containing digits in an optional
/// non-capturing group: `\(\d+\)` → `(?:\(\d+\))?`.
pub fn make_paren_groups_optional(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '\\' && chars.get(i + 1) == Some(&'(') {
            if let Some(close) = find_escaped_close(&chars, i + 2) {
                let group: String = chars[i..close + 2].iter().collect();
                if group.contains("\\d") {
                    out.push_str("(?:");
                    out.push_str(&group);
                    out.push_str(")?");
                } else {
                    out.push_str(&group);
                }
                i = close + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

fn find_escaped_close(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '\\' && chars[i + 1] == ')' {
            return Some(i);
        }
        i += if chars[i] == '\\' { 2 } else { 1 };
    }
    None
}

/// Strip code fences, quotes, and `r"..."` wrappers from an oracle pattern
/// response and take the first non-empty line.
pub fn extract_pattern_text(response: &str) -> String {
    let mut text = response.trim();
    if let Some(stripped) = text.strip_prefix("```") {
        let stripped = stripped
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
        text = stripped.split("```").next().unwrap_or(stripped).trim();
    }

    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut line = line.trim();

    for prefix in ["PATTERN:", "pattern:", "regex:"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest.trim();
        }
    }
    if let Some(rest) = line.strip_prefix("r\"").and_then(|r| r.strip_suffix('"')) {
        line = rest;
    } else if line.len() >= 2 && line.starts_with('"') && line.ends_with('"') {
        line = &line[1..line.len() - 1];
    } else if line.len() >= 2 && line.starts_with('`') && line.ends_with('`') {
        line = &line[1..line.len() - 1];
    }
    line.trim().to_string()
}

fn tagged_line(response: &str, tag: &str) -> Option<String> {
    response
        .lines()
        .find(|l| l.trim_start().starts_with(tag))
        .map(|l| l.trim_start().trim_start_matches(tag).trim().to_string())
        .filter(|l| !l.is_empty())
}

/// Title lines from an enumeration response: trimmed, bullets stripped,
/// noise dropped.
fn parse_title_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .to_string()
        })
        .filter(|l| {
            !l.is_empty()
                && !l.starts_with("TITLES")
                && !l.starts_with("NO_")
                && !l.contains(sampler::SAMPLE_SKIP_MARKER)
                && l.chars().count() <= 120
        })
        .collect()
}

// ---- prompts ------------------------------------------------------------

fn analysis_prompt(
    sample: &str,
    expected: usize,
    attempt: u32,
    end_markers: &[String],
) -> String {
    let strictness = match attempt {
        0 => "",
        1 => "\nYour previous answer did not match any line. Look again at the exact \
               title lines in the sample and keep the pattern simple.",
        _ => "\nThis is the final attempt. Emit the simplest pattern that matches the \
               visible chapter-title lines character for character.",
    };
    format!(
        "=== chapter_pattern_analysis ===\n\
         You are analyzing a serialized novel with about {expected} chapters.\n\
         \n\
         [Sample]\n{sample}\n\
         \n\
         [Task]\n\
         Emit ONE raw regular expression that matches exactly the chapter-title \
         lines.\n\
         Recognized marker families: numbered (제N화, N화, 第N章, Chapter N), \
         bracketed (< 제목 >, [제목]), decorated separators (━━ N화 ━━).\n\
         The pattern must NOT match end-of-chapter lines: lines whose tail is one \
         of {}.\n\
         Respond with the regular expression only. No explanation, no code fence.{strictness}",
        end_markers.join(", ")
    )
}

fn gap_prompt(sample: &str, pattern: &str, expected: usize, end_markers: &[String]) -> String {
    format!(
        "=== gap_pattern_refinement ===\n\
         The pattern `{pattern}` misses chapters inside this span of a novel \
         expected to have {expected} chapters.\n\
         \n\
         [Span]\n{sample}\n\
         \n\
         [Task]\n\
         Either reply `PATTERN: <regex>` with a broader regular expression that \
         also matches the chapter-title lines in this span, or list the \
         chapter-title lines you can see, one per line.\n\
         Never match end-of-chapter lines (tail in {}).\n\
         If the span holds no chapter titles, reply `NO_PATTERN_FOUND`.",
        end_markers.join(", ")
    )
}

fn direct_search_prompt(sample: &str, expected: usize, examples: &[&str]) -> String {
    let few_shot = if examples.is_empty() {
        String::new()
    } else {
        format!(
            "\n[Known title lines from this novel]\n{}\n",
            examples.join("\n")
        )
    };
    format!(
        "=== direct_title_search ===\n\
         This novel has about {expected} chapters.\n\
         {few_shot}\
         [Sample]\n{sample}\n\
         \n\
         [Task]\n\
         List every line in the sample that is a chapter title, exactly as it \
         appears, one per line. Lines ending with an end-of-chapter marker are \
         not titles. If none, reply `NO_TITLES_FOUND`.",
    )
}

fn reverse_pattern_prompt(titles: &[String], end_markers: &[String]) -> String {
    let shown: Vec<&str> = titles.iter().take(20).map(|t| t.as_str()).collect();
    format!(
        "=== reverse_pattern_extraction ===\n\
         [Chapter titles]\n{}\n\
         \n\
         [Task]\n\
         Emit ONE raw regular expression matching ALL of the titles above and \
         nothing resembling an end-of-chapter line (tail in {}).\n\
         Respond with the regular expression only.",
        shown.join("\n"),
        end_markers.join(", ")
    )
}

fn candidate_extraction_prompt(sample: &str, pattern: &str) -> String {
    format!(
        "=== title_candidate_extraction ===\n\
         The pattern `{pattern}` fails to match some chapter titles in this span.\n\
         \n\
         [Span]\n{sample}\n\
         \n\
         [Task]\n\
         List the chapter-title lines the pattern misses, exactly as they appear, \
         one per line. If none, reply `NO_TITLES_FOUND`.",
    )
}
