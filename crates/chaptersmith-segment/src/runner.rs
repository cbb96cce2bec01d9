//! The chapter split runner.
//!
//! Drives pattern acquisition, the first regex split, and the escalation
//! ladder: deterministic auto-repair, gap-directed refinement (with
//! stagnation and rejection-streak early exits), direct title search with
//! reverse-regex synthesis, and the structural/AI/optimizer pipeline. A
//! run either yields exactly the expected chapter count or fails with the
//! best partial result and the full reconciliation log.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chaptersmith_core::{Error, MetadataHints, Result, SegmentConfig};
use chaptersmith_oracle::TextOracle;
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::boundary::{validate_boundaries, Boundary, BoundarySource, Candidate};
use crate::chapter::Chapter;
use crate::log::{ReconciliationLog, Stage};
use crate::optimizer::GlobalOptimizer;
use crate::pattern::{self, PatternManager};
use crate::sampler;
use crate::scorer::AiScorer;
use crate::source::SourceFile;
use crate::splitter::{self, PatternMatch, Splitter};
use crate::structural::StructuralAnalyzer;
use crate::topic::TopicChangeDetector;

/// Structural candidates this close to a pattern-match anchor are
/// redundant when thinning an oversized pool.
const MIN_ANCHOR_LINE_DISTANCE: usize = 10;

static FIRST_NUMBER: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\d+").expect("number pattern compiles"));

/// A successful run: exactly the expected chapters, plus the decision log.
#[derive(Debug)]
pub struct Segmentation {
    pub chapters: Vec<Chapter>,
    pub log: ReconciliationLog,
}

/// A failed run: the failure kind, the best partial segmentation for
/// manual review, and the decision log.
#[derive(Debug)]
pub struct SegmentationFailure {
    pub error: Error,
    pub partial: Vec<Chapter>,
    pub log: ReconciliationLog,
}

struct RunState {
    log: ReconciliationLog,
    best: Vec<Chapter>,
    deadline: Instant,
    budget_secs: u64,
}

impl RunState {
    fn guard(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Error::Timeout(self.budget_secs));
        }
        Ok(())
    }
}

pub struct SplitRunner {
    oracle: Arc<dyn TextOracle>,
    config: SegmentConfig,
    cancel: CancellationToken,
}

impl SplitRunner {
    pub fn new(oracle: Arc<dyn TextOracle>, config: SegmentConfig) -> Self {
        Self {
            oracle,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an external cancellation token; the runner checks it before
    /// every oracle call and file pass.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Segment a file into exactly `expected` chapters.
    pub async fn run(
        &self,
        path: &Path,
        expected: usize,
        hints: Option<&MetadataHints>,
    ) -> std::result::Result<Segmentation, SegmentationFailure> {
        let source = match SourceFile::load(path) {
            Ok(source) => source,
            Err(error) => {
                return Err(SegmentationFailure {
                    error,
                    partial: Vec::new(),
                    log: ReconciliationLog::default(),
                })
            }
        };
        self.run_source(&source, expected, hints).await
    }

    /// Segment an already-loaded source.
    pub async fn run_source(
        &self,
        source: &SourceFile,
        expected: usize,
        hints: Option<&MetadataHints>,
    ) -> std::result::Result<Segmentation, SegmentationFailure> {
        let mut state = RunState {
            log: ReconciliationLog::default(),
            best: Vec::new(),
            deadline: Instant::now() + Duration::from_secs(self.config.run_budget_secs),
            budget_secs: self.config.run_budget_secs,
        };

        match self.drive(source, expected, hints, &mut state).await {
            Ok(chapters) => {
                info!("Segmentation complete: {} chapters", chapters.len());
                state
                    .log
                    .record(Stage::Done, "exact-match", chapters.len(), chapters.len(), "");
                Ok(Segmentation {
                    chapters,
                    log: state.log,
                })
            }
            Err(error) => {
                warn!("Segmentation failed: {error}");
                state.log.record(
                    Stage::Fail,
                    "run-failed",
                    state.best.len(),
                    expected,
                    error.to_string(),
                );
                let missing = find_missing_episodes(&state.best, expected);
                if !missing.is_empty() {
                    let shown: Vec<String> =
                        missing.iter().take(10).map(|n| n.to_string()).collect();
                    state.log.record(
                        Stage::Fail,
                        "missing-episodes",
                        state.best.len(),
                        expected,
                        shown.join(", "),
                    );
                }
                // Cancellation yields no partial chapters at all.
                let partial = if matches!(error, Error::Cancelled) {
                    Vec::new()
                } else {
                    std::mem::take(&mut state.best)
                };
                Err(SegmentationFailure {
                    error,
                    partial,
                    log: state.log,
                })
            }
        }
    }

    async fn drive(
        &self,
        source: &SourceFile,
        expected: usize,
        hints: Option<&MetadataHints>,
        state: &mut RunState,
    ) -> Result<Vec<Chapter>> {
        if expected == 0 {
            return Err(Error::InvalidInput(
                "expected chapter count must be positive".into(),
            ));
        }

        state.log.record(
            Stage::Init,
            "start",
            0,
            expected,
            format!(
                "{} bytes, {} lines, encoding {}",
                source.raw_len,
                source.line_count(),
                source.encoding.name()
            ),
        );

        let extra_markers = hints
            .map(|h| h.known_end_markers.clone())
            .unwrap_or_default();
        let pm = PatternManager::new(self.oracle.clone(), &self.config, &extra_markers);
        let splitter = Splitter::new(&self.config);

        state.guard(&self.cancel)?;

        // PATTERN_ACQUIRE
        let mut oracle_down = false;
        let mut pattern = match pm.analyze(source, expected).await {
            Ok(pattern) => pattern,
            Err(Error::OracleUnavailable(message)) => {
                warn!("Oracle unavailable during pattern acquisition: {message}");
                oracle_down = true;
                match pm.universal_fallback(source) {
                    Some(fallback) => {
                        state.log.record(
                            Stage::PatternAcquire,
                            "universal-fallback",
                            0,
                            0,
                            format!("oracle down: {message}"),
                        );
                        fallback
                    }
                    None if expected == 1 => return Ok(whole_file_chapter(source, state)),
                    None => return Err(Error::OracleUnavailable(message)),
                }
            }
            Err(Error::PatternUnusable(_)) if expected == 1 => {
                return Ok(whole_file_chapter(source, state))
            }
            Err(e) => return Err(e),
        };

        let initial_count = splitter::match_positions(source, &pattern)
            .map(|m| m.len())
            .unwrap_or(0);
        state.log.record(
            Stage::PatternAcquire,
            "initial-pattern",
            0,
            initial_count,
            pattern.clone(),
        );

        // REGEX_SPLIT
        let mut chapters = splitter.split(source, &pattern, &[])?;
        if let Some(first) = chapters.first() {
            if first.start_offset > 0 {
                state.log.record(
                    Stage::RegexSplit,
                    "prelude-discarded",
                    0,
                    chapters.len(),
                    format!("{} bytes before first chapter", first.start_offset),
                );
            }
        }
        state.best = chapters.clone();

        // A single expected chapter with no detected header is the whole
        // file, untitled.
        if expected == 1 && chapters.is_empty() {
            return Ok(whole_file_chapter(source, state));
        }

        // EVALUATE
        if chapters.len() == expected {
            return Ok(chapters);
        }
        state
            .log
            .record(Stage::Evaluate, "count-mismatch", chapters.len(), expected, "");

        // AUTO_REPAIR
        state.guard(&self.cancel)?;
        let outcome = pm.auto_validate(source, &pattern, expected);
        if outcome.pattern != pattern || outcome.drop_close_duplicates {
            let before = chapters.len();
            if outcome.pattern != pattern {
                pattern = outcome.pattern.clone();
                chapters = splitter.split(source, &pattern, &[])?;
            }
            if outcome.drop_close_duplicates && chapters.len() > expected {
                let matches = splitter::match_positions(source, &pattern)?;
                let deduped =
                    splitter::drop_close_duplicates(&matches, self.config.min_pair_gap);
                if deduped.len() == expected {
                    let boundaries = matches_to_boundaries(&deduped);
                    validate_boundaries(&boundaries, source, Some(expected))?;
                    chapters = splitter.split_by_boundaries(source, &boundaries)?;
                }
            }
            state.log.record(
                Stage::AutoRepair,
                outcome.actions.join(", "),
                before,
                chapters.len(),
                pattern.clone(),
            );
            state.best = chapters.clone();
        } else {
            state
                .log
                .record(Stage::AutoRepair, "no-op", chapters.len(), chapters.len(), "");
        }
        if chapters.len() == expected {
            return Ok(chapters);
        }

        // GAP_REFINE
        let mut history: Vec<usize> = Vec::new();
        let mut consecutive_rejections: u32 = 0;
        let mut retry: u32 = 0;

        while !oracle_down && chapters.len() != expected && retry < self.config.max_retries {
            retry += 1;
            state.guard(&self.cancel)?;
            history.push(chapters.len());

            if is_stagnant(
                &history,
                self.config.stagnation_window,
                self.config.stagnation_tolerance,
            ) {
                let recent =
                    &history[history.len() - self.config.stagnation_window..];
                state.log.record(
                    Stage::GapRefine,
                    "stagnation",
                    chapters.len(),
                    expected,
                    format!(
                        "counts {recent:?} within ±{}",
                        self.config.stagnation_tolerance
                    ),
                );
                break;
            }

            let (refined, rejections) = match pm.refine(source, &pattern, expected).await {
                Ok(result) => result,
                Err(Error::OracleUnavailable(message)) => {
                    warn!("Oracle lost during refinement: {message}");
                    oracle_down = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            if rejections > 0 {
                consecutive_rejections += rejections;
                if consecutive_rejections >= self.config.rejection_threshold {
                    state.log.record(
                        Stage::GapRefine,
                        "rejection-streak",
                        chapters.len(),
                        expected,
                        format!("{consecutive_rejections} consecutive rejections"),
                    );
                    break;
                }
            } else {
                consecutive_rejections = 0;
            }

            if refined != pattern {
                pattern = refined;
                let before = chapters.len();
                chapters = splitter.split(source, &pattern, &[])?;
                state.log.record(
                    Stage::GapRefine,
                    "refined-pattern",
                    before,
                    chapters.len(),
                    format!("iteration {retry}"),
                );
                state.best = chapters.clone();

                if retry >= self.config.title_candidate_retry_threshold
                    && chapters.len() < expected
                {
                    let mined = match self
                        .mine_title_candidates(source, &pm, &pattern, expected)
                        .await
                    {
                        Ok(candidates) => candidates,
                        Err(Error::OracleUnavailable(_)) => {
                            oracle_down = true;
                            Vec::new()
                        }
                        Err(_) => Vec::new(),
                    };
                    if !mined.is_empty() {
                        let before = chapters.len();
                        let with_candidates = splitter.split(source, &pattern, &mined)?;
                        state.log.record(
                            Stage::GapRefine,
                            "title-candidates",
                            before,
                            with_candidates.len(),
                            format!("{} candidates via consensus", mined.len()),
                        );
                        chapters = with_candidates;
                        state.best = chapters.clone();
                    }
                }
            } else {
                state.log.record(
                    Stage::GapRefine,
                    "no-improvement",
                    chapters.len(),
                    chapters.len(),
                    format!("iteration {retry}"),
                );
            }
        }
        if chapters.len() == expected {
            return Ok(chapters);
        }

        // DIRECT_SEARCH: only worthwhile while the count runs short.
        if !oracle_down
            && (chapters.len() as f64) < self.config.direct_search_trigger * expected as f64
        {
            state.guard(&self.cancel)?;
            let existing = splitter::match_positions(source, &pattern).unwrap_or_default();

            match pm.direct_title_search(source, expected, &existing).await {
                Ok(titles)
                    if titles.len() as f64
                        >= self.config.direct_search_min_yield * expected as f64 =>
                {
                    match pm.pattern_from_examples(source, &titles).await {
                        Ok(Some(reverse)) => {
                            let combined = format!("{pattern}|{reverse}");
                            match splitter.split(source, &combined, &[]) {
                                Ok(combined_chapters) => {
                                    let before = chapters.len();
                                    if combined_chapters.len() == expected {
                                        state.log.record(
                                            Stage::DirectSearch,
                                            "reverse-pattern-exact",
                                            before,
                                            combined_chapters.len(),
                                            combined,
                                        );
                                        return Ok(combined_chapters);
                                    }
                                    if combined_chapters.len().abs_diff(expected)
                                        < chapters.len().abs_diff(expected)
                                    {
                                        state.log.record(
                                            Stage::DirectSearch,
                                            "reverse-pattern-improved",
                                            before,
                                            combined_chapters.len(),
                                            combined.clone(),
                                        );
                                        pattern = combined;
                                        chapters = combined_chapters;
                                        state.best = chapters.clone();
                                    } else {
                                        state.log.record(
                                            Stage::DirectSearch,
                                            "no-improvement",
                                            before,
                                            combined_chapters.len(),
                                            "",
                                        );
                                    }
                                }
                                Err(e) => {
                                    warn!("Combined pattern unusable: {e}");
                                }
                            }
                        }
                        Ok(None) => {
                            state.log.record(
                                Stage::DirectSearch,
                                "reverse-pattern-rejected",
                                chapters.len(),
                                chapters.len(),
                                "",
                            );
                        }
                        Err(Error::OracleUnavailable(_)) => oracle_down = true,
                        Err(e) => return Err(e),
                    }
                }
                Ok(titles) => {
                    state.log.record(
                        Stage::DirectSearch,
                        "insufficient-titles",
                        chapters.len(),
                        titles.len(),
                        format!("need {:.0}", self.config.direct_search_min_yield * expected as f64),
                    );
                }
                Err(Error::OracleUnavailable(_)) => oracle_down = true,
                Err(e) => return Err(e),
            }
        }
        if chapters.len() == expected {
            return Ok(chapters);
        }

        // ADVANCED
        if oracle_down {
            return Err(Error::OracleUnavailable(
                "pattern-only best effort; the oracle is required for further recovery".into(),
            ));
        }
        state.guard(&self.cancel)?;
        if let Some(advanced) = self
            .advanced_pipeline(source, expected, &pattern, state)
            .await?
        {
            if advanced.len() == expected {
                return Ok(advanced);
            }
            if advanced.len().abs_diff(expected) < chapters.len().abs_diff(expected) {
                chapters = advanced;
                state.best = chapters.clone();
            }
        }

        Err(Error::Stagnated {
            got: chapters.len(),
            expected,
        })
    }

    /// The structural → scorer → topic → optimizer → boundary-split
    /// pipeline, with the result quality gate.
    async fn advanced_pipeline(
        &self,
        source: &SourceFile,
        expected: usize,
        pattern: &str,
        state: &mut RunState,
    ) -> Result<Option<Vec<Chapter>>> {
        let anchors = splitter::match_positions(source, pattern).unwrap_or_default();

        let analyzer = StructuralAnalyzer::new(&self.config);
        let mut candidates = analyzer.generate_candidates(source, expected);
        if candidates.is_empty() {
            state
                .log
                .record(Stage::Advanced, "no-structural-candidates", 0, 0, "");
            return Ok(None);
        }
        state.log.record(
            Stage::Advanced,
            "structural-candidates",
            0,
            candidates.len(),
            "",
        );

        // Thin an oversized pool around positions the pattern already
        // proves, to spare scoring calls.
        if !anchors.is_empty() && candidates.len() > self.config.scorer_hard_cap {
            let before = candidates.len();
            candidates.retain(|c| {
                anchors
                    .iter()
                    .all(|a| c.line_num.abs_diff(a.line_num) >= MIN_ANCHOR_LINE_DISTANCE)
            });
            state.log.record(
                Stage::Advanced,
                "anchor-filter",
                before,
                candidates.len(),
                format!("{} anchors", anchors.len()),
            );
        }

        let scorer = AiScorer::new(self.oracle.clone(), &self.config);
        scorer.score(source, &mut candidates).await;

        let coverage = candidates.len() as f64 / expected as f64;
        if coverage < self.config.topic_activation_coverage {
            let detector = TopicChangeDetector::new(self.oracle.clone(), &self.config);
            let topics = detector.detect(source, expected, &candidates).await;
            if !topics.is_empty() {
                state.log.record(
                    Stage::Advanced,
                    "topic-candidates",
                    candidates.len(),
                    candidates.len() + topics.len(),
                    "",
                );
                candidates.extend(topics);
            }
        }

        // Pattern matches join the pool as full-confidence candidates.
        for anchor in &anchors {
            if candidates.iter().all(|c| c.line_num != anchor.line_num) {
                candidates.push(Candidate {
                    line_num: anchor.line_num,
                    byte_offset: anchor.byte_offset,
                    text: anchor.text.clone(),
                    structural: 1.0,
                    ai: Some(1.0),
                    source: BoundarySource::Regex,
                });
            }
        }

        let selection = GlobalOptimizer::new(&self.config).select(
            &candidates,
            expected,
            source.raw_len,
        );
        state.log.record(
            Stage::Advanced,
            "optimizer",
            candidates.len(),
            selection.boundaries.len(),
            if selection.shortfall > 0 {
                format!("shortfall {}", selection.shortfall)
            } else {
                String::new()
            },
        );
        if selection.boundaries.len() != expected {
            return Ok(None);
        }

        validate_boundaries(&selection.boundaries, source, Some(expected))?;
        let chapters =
            Splitter::new(&self.config).split_by_boundaries(source, &selection.boundaries)?;

        // Quality gate: an exact count built from junk boundaries is worse
        // than an honest failure.
        let empty = chapters
            .iter()
            .filter(|c| c.length < self.config.min_valid_chapter_len)
            .count();
        let empty_ratio = empty as f64 / chapters.len() as f64;
        let avg_len =
            chapters.iter().map(|c| c.length).sum::<usize>() as f64 / chapters.len() as f64;
        if empty_ratio > self.config.max_empty_chapter_ratio
            || avg_len < self.config.min_avg_chapter_len as f64
        {
            state.log.record(
                Stage::Advanced,
                "quality-gate-rejected",
                chapters.len(),
                chapters.len(),
                format!("empty ratio {empty_ratio:.2}, avg length {avg_len:.0}"),
            );
            return Ok(None);
        }

        state.log.record(
            Stage::Advanced,
            "boundary-split",
            expected,
            chapters.len(),
            "",
        );
        Ok(Some(chapters))
    }

    /// Mine the largest gaps for explicit title-candidate lines.
    async fn mine_title_candidates(
        &self,
        source: &SourceFile,
        pm: &PatternManager<'_>,
        current_pattern: &str,
        expected: usize,
    ) -> Result<Vec<String>> {
        let matches = splitter::match_positions(source, current_pattern)?;
        let gaps = pattern::dynamic_gaps(source, &matches, expected);

        let mut all: Vec<String> = Vec::new();
        for gap in gaps.iter().take(self.config.max_gaps_to_analyze) {
            let center = gap.start + (gap.end - gap.start) / 2;
            let window = sampler::extract_around(
                source,
                center,
                ((gap.end - gap.start) / 2).min(15_000),
            );
            let found = pm
                .extract_title_candidates(source, &window.text, current_pattern)
                .await?;
            for title in found {
                if !all.contains(&title) {
                    all.push(title);
                }
            }
        }
        Ok(all)
    }
}

/// The entire file as one untitled chapter.
fn whole_file_chapter(source: &SourceFile, state: &mut RunState) -> Vec<Chapter> {
    state.log.record(
        Stage::Evaluate,
        "whole-file-chapter",
        0,
        1,
        "no header detected; expected a single chapter",
    );
    let body = source.joined_text().trim().to_string();
    vec![Chapter::new(0, "", "", body, 0)]
}

fn matches_to_boundaries(matches: &[PatternMatch]) -> Vec<Boundary> {
    matches
        .iter()
        .map(|m| Boundary {
            line_num: m.line_num,
            byte_offset: m.byte_offset,
            text: m.text.clone(),
            score: None,
            source: BoundarySource::Regex,
        })
        .collect()
}

/// Stagnation: the last `window` counts spread at most `tolerance` apart.
pub fn is_stagnant(history: &[usize], window: usize, tolerance: usize) -> bool {
    if history.len() < window {
        return false;
    }
    let recent = &history[history.len() - window..];
    let min = recent.iter().min().copied().unwrap_or(0);
    let max = recent.iter().max().copied().unwrap_or(0);
    max - min <= tolerance
}

/// Episode numbers absent from the chapter titles, for the diagnostics
/// log.
pub fn find_missing_episodes(chapters: &[Chapter], expected: usize) -> Vec<usize> {
    let mut found = std::collections::HashSet::new();
    for chapter in chapters {
        if let Some(m) = FIRST_NUMBER.find(&chapter.title) {
            if let Ok(n) = m.as_str().parse::<usize>() {
                found.insert(n);
            }
        }
    }
    (1..=expected).filter(|n| !found.contains(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stagnant() {
        assert!(is_stagnant(&[85, 87, 85], 3, 2));
        assert!(is_stagnant(&[85, 85, 85], 3, 2));
        assert!(!is_stagnant(&[85, 87], 3, 2));
        assert!(!is_stagnant(&[80, 87, 85], 3, 2));
        // Only the trailing window matters
        assert!(is_stagnant(&[10, 50, 85, 86, 85], 3, 2));
    }

    #[test]
    fn test_find_missing_episodes() {
        let chapters: Vec<Chapter> = [1usize, 2, 4, 5]
            .iter()
            .map(|i| Chapter::new(*i as u32, format!("제{i}화"), "", "본문", *i as u64 * 100))
            .collect();
        assert_eq!(find_missing_episodes(&chapters, 6), vec![3, 6]);
        assert!(find_missing_episodes(&chapters, 2).is_empty());
    }
}
