//! Run configuration.
//!
//! Every threshold the corpus taught us (close-duplicate gap, stagnation
//! tolerance, escalation limits) is a field here rather than a hard-coded
//! constant, so operators can re-tune per collection.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// End-of-chapter lexemes observed across the corpus. Lines whose
/// non-whitespace tail ends with one of these are paired end markers,
/// not chapter starts.
pub const DEFAULT_END_MARKERS: &[&str] =
    &["끝", "완", "END", "end", "fin", "종료", "끗", "完"];

/// Tuning for one segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Byte budget per head/middle/tail sample window.
    #[serde(default = "default_sample_window_bytes")]
    pub sample_window_bytes: usize,
    /// Number of uniform sample windows for whole-file sweeps.
    #[serde(default = "default_uniform_sample_count")]
    pub uniform_sample_count: usize,

    /// Maximum extracted title length in code points.
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
    /// Probe length (code points) for bracketed multi-line title detection.
    #[serde(default = "default_bracket_probe_len")]
    pub bracket_probe_len: usize,
    /// A post-title tail longer than this many code points is body text,
    /// not a subtitle.
    #[serde(default = "default_title_tail_limit")]
    pub title_tail_limit: usize,

    /// Matches closer than this many bytes are a start/end duplicate pair;
    /// the second is dropped.
    #[serde(default = "default_min_pair_gap")]
    pub min_pair_gap: u64,

    /// Maximum gap-refinement iterations before escalating.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry iteration from which gap-mined title candidates are fed to
    /// the splitter.
    #[serde(default = "default_title_candidate_retry_threshold")]
    pub title_candidate_retry_threshold: u32,
    /// Largest gaps analyzed per refinement iteration.
    #[serde(default = "default_max_gaps_to_analyze")]
    pub max_gaps_to_analyze: usize,
    /// Window of recent counts inspected for stagnation.
    #[serde(default = "default_stagnation_window")]
    pub stagnation_window: usize,
    /// Count spread (max - min) at or below which the window is stagnant.
    #[serde(default = "default_stagnation_tolerance")]
    pub stagnation_tolerance: usize,
    /// Consecutive refinement rejections that trigger immediate escalation.
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: u32,

    /// Direct title search fires when the best count falls below this
    /// fraction of the expected count.
    #[serde(default = "default_direct_search_trigger")]
    pub direct_search_trigger: f64,
    /// Minimum fraction of the expected count the direct search must yield
    /// before reverse-regex synthesis is attempted.
    #[serde(default = "default_direct_search_min_yield")]
    pub direct_search_min_yield: f64,

    /// Structural candidate cap as a multiple of the expected count.
    #[serde(default = "default_structural_fanout")]
    pub structural_fanout: usize,
    /// Candidates per scoring prompt.
    #[serde(default = "default_scorer_batch_size")]
    pub scorer_batch_size: usize,
    /// Above this many candidates the scorer is skipped outright.
    #[serde(default = "default_scorer_hard_cap")]
    pub scorer_hard_cap: usize,
    /// Context lines on each side of a scored candidate.
    #[serde(default = "default_scorer_context_lines")]
    pub scorer_context_lines: usize,

    /// Sliding-window size for topic change detection, in bytes.
    #[serde(default = "default_topic_window_bytes")]
    pub topic_window_bytes: usize,
    /// Minimum topic-change score that becomes a candidate.
    #[serde(default = "default_topic_change_threshold")]
    pub topic_change_threshold: f64,
    /// Topic detection activates only while candidate coverage
    /// (candidates / expected) stays below this ratio.
    #[serde(default = "default_topic_activation_coverage")]
    pub topic_activation_coverage: f64,
    /// Absolute per-file oracle call budget for topic detection.
    #[serde(default = "default_topic_call_budget")]
    pub topic_call_budget: usize,

    /// Floor for the optimizer's minimum boundary spacing, in bytes.
    #[serde(default = "default_min_spacing_floor")]
    pub min_spacing_floor: u64,
    /// Times the optimizer may halve the spacing before reporting shortfall.
    #[serde(default = "default_spacing_relax_passes")]
    pub spacing_relax_passes: u32,

    /// Chapters shorter than this many code points count as empty for the
    /// advanced-pipeline quality gate.
    #[serde(default = "default_min_valid_chapter_len")]
    pub min_valid_chapter_len: usize,
    /// Advanced results with more than this fraction of empty chapters are
    /// rejected.
    #[serde(default = "default_max_empty_chapter_ratio")]
    pub max_empty_chapter_ratio: f64,
    /// Advanced results with a mean body length below this are rejected.
    #[serde(default = "default_min_avg_chapter_len")]
    pub min_avg_chapter_len: usize,

    /// Wall-clock budget for one run, in seconds.
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,

    /// End-of-chapter lexemes. Extended per-run by
    /// [`MetadataHints::known_end_markers`].
    #[serde(default = "default_end_markers")]
    pub end_markers: Vec<String>,
}

fn default_sample_window_bytes() -> usize {
    20 * 1024
}
fn default_uniform_sample_count() -> usize {
    30
}
fn default_max_title_len() -> usize {
    100
}
fn default_bracket_probe_len() -> usize {
    50
}
fn default_title_tail_limit() -> usize {
    20
}
fn default_min_pair_gap() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    5
}
fn default_title_candidate_retry_threshold() -> u32 {
    2
}
fn default_max_gaps_to_analyze() -> usize {
    3
}
fn default_stagnation_window() -> usize {
    3
}
fn default_stagnation_tolerance() -> usize {
    2
}
fn default_rejection_threshold() -> u32 {
    2
}
fn default_direct_search_trigger() -> f64 {
    0.95
}
fn default_direct_search_min_yield() -> f64 {
    0.5
}
fn default_structural_fanout() -> usize {
    5
}
fn default_scorer_batch_size() -> usize {
    10
}
fn default_scorer_hard_cap() -> usize {
    200
}
fn default_scorer_context_lines() -> usize {
    5
}
fn default_topic_window_bytes() -> usize {
    2048
}
fn default_topic_change_threshold() -> f64 {
    0.5
}
fn default_topic_activation_coverage() -> f64 {
    1.2
}
fn default_topic_call_budget() -> usize {
    120
}
fn default_min_spacing_floor() -> u64 {
    2000
}
fn default_spacing_relax_passes() -> u32 {
    3
}
fn default_min_valid_chapter_len() -> usize {
    100
}
fn default_max_empty_chapter_ratio() -> f64 {
    0.1
}
fn default_min_avg_chapter_len() -> usize {
    500
}
fn default_run_budget_secs() -> u64 {
    900
}
fn default_end_markers() -> Vec<String> {
    DEFAULT_END_MARKERS.iter().map(|s| s.to_string()).collect()
}

impl Default for SegmentConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default config deserializes")
    }
}

impl SegmentConfig {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields. A missing or unreadable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Bad config at {}: {} (using defaults)", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Advisory hints supplied alongside a file. Never authoritative: the
/// engine may use them to widen its vocabulary, not to skip validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataHints {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub volume_markers: Vec<String>,
    /// Additional end-marker lexemes known for this source.
    #[serde(default)]
    pub known_end_markers: Vec<String>,
}
