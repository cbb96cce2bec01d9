//! Chapter splitting.
//!
//! Regex mode walks the line table once, recognizing header lines by
//! pattern match or explicit title candidate, merging two-line titles, and
//! trimming body text that rides on a title line. Boundary mode bypasses
//! patterns entirely and cuts the file at pre-validated line positions.

use chaptersmith_core::{Error, Result, SegmentConfig};
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::boundary::{validate_boundaries, Boundary};
use crate::chapter::Chapter;
use crate::source::SourceFile;

/// Patterns that match any non-empty line. Combined with explicit title
/// candidates they switch the splitter to candidate-only matching.
pub const PERMISSIVE_PATTERNS: &[&str] = &[".+", ".", ".*"];

/// Coverage is acceptable when the last match sits in the final 1% of the
/// file or within this many bytes of the end.
pub const COVERAGE_TAIL_BYTES: u64 = 20_000;

static BRACKET_PROBE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\[.*?\]").expect("bracket probe compiles"));

/// A pattern match with its file position.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub line_num: usize,
    pub byte_offset: u64,
    pub text: String,
}

/// How much of the file a pattern's matches span.
#[derive(Debug, Clone, Copy)]
pub struct CoverageStats {
    pub match_count: usize,
    pub last_match_offset: u64,
    pub last_match_ratio: f64,
    pub tail_bytes: u64,
    pub coverage_ok: bool,
}

/// Compile a chapter-header pattern. Lookaround is allowed; compile errors
/// surface as `PatternUnusable`.
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::PatternUnusable(format!("invalid regex: {e}")))
}

fn line_matches(regex: &Regex, line: &str) -> bool {
    matches!(regex.find(line), Ok(Some(_)))
}

/// Every line the pattern matches, with raw byte offsets.
pub fn match_positions(source: &SourceFile, pattern: &str) -> Result<Vec<PatternMatch>> {
    let regex = compile(pattern)?;
    let mut matches = Vec::new();
    for (line_num, line) in source.lines.iter().enumerate() {
        let trimmed = line.text.trim();
        if !trimmed.is_empty() && line_matches(&regex, trimmed) {
            matches.push(PatternMatch {
                line_num,
                byte_offset: line.byte_offset,
                text: trimmed.to_string(),
            });
        }
    }
    Ok(matches)
}

/// Coverage statistics for a pattern over a file.
pub fn verify_coverage(source: &SourceFile, pattern: &str) -> Result<CoverageStats> {
    let matches = match_positions(source, pattern)?;
    let last_match_offset = matches.last().map(|m| m.byte_offset).unwrap_or(0);
    let last_match_ratio = if source.raw_len > 0 {
        last_match_offset as f64 / source.raw_len as f64
    } else {
        0.0
    };
    let tail_bytes = source.raw_len - last_match_offset;
    Ok(CoverageStats {
        match_count: matches.len(),
        last_match_offset,
        last_match_ratio,
        tail_bytes,
        coverage_ok: last_match_ratio > 0.99 || tail_bytes < COVERAGE_TAIL_BYTES,
    })
}

/// Drop the second of any match pair closer than `min_gap` bytes: paired
/// start/end markers, or an author's duplicated start marker.
pub fn drop_close_duplicates(matches: &[PatternMatch], min_gap: u64) -> Vec<PatternMatch> {
    let mut kept: Vec<PatternMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        match kept.last() {
            Some(prev) if m.byte_offset - prev.byte_offset < min_gap => {
                debug!(
                    "Dropping close duplicate at {} (prev at {}): {}",
                    m.byte_offset, prev.byte_offset, m.text
                );
            }
            _ => kept.push(m.clone()),
        }
    }
    kept
}

pub struct Splitter<'a> {
    config: &'a SegmentConfig,
}

impl<'a> Splitter<'a> {
    pub fn new(config: &'a SegmentConfig) -> Self {
        Self { config }
    }

    /// Regex-mode split. A line is a chapter header iff the pattern matches
    /// it or it carries one of the explicit `title_candidates`.
    pub fn split(
        &self,
        source: &SourceFile,
        pattern: &str,
        title_candidates: &[String],
    ) -> Result<Vec<Chapter>> {
        let regex = compile(pattern)?;
        let using_candidates = !title_candidates.is_empty();
        let candidate_only = using_candidates && PERMISSIVE_PATTERNS.contains(&pattern);

        if using_candidates {
            debug!(
                "Splitter: {} title candidates, pattern '{}' ({})",
                title_candidates.len(),
                pattern,
                if candidate_only { "permissive" } else { "specific" }
            );
        }

        let max_title = self.config.max_title_len;
        let mut chapters: Vec<Chapter> = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut current_title = String::new();
        let mut current_subtitle = String::new();
        let mut chapter_start: u64 = 0;
        let mut first_match_found = false;
        let mut pending_title: Option<String> = None;
        // Text from a folded micro-chapter, prepended to the next body so
        // no source line is lost.
        let mut carry_prefix: Option<String> = None;

        for line in source.lines.iter() {
            let trimmed = line.text.trim();
            if trimmed.is_empty() {
                if first_match_found {
                    buffer.push(String::new());
                }
                pending_title = None;
                continue;
            }

            let is_explicit = using_candidates
                && title_candidates
                    .iter()
                    .any(|c| trimmed == c || trimmed.contains(c.as_str()));
            let matched = regex.find(trimmed).unwrap_or(None);
            let is_boundary = if candidate_only {
                is_explicit
            } else {
                matched.is_some() || is_explicit
            };

            if is_boundary {
                // Two consecutive header lines merge into one title.
                if let (Some(pending), true) = (pending_title.take(), first_match_found) {
                    current_title =
                        format!("{} | {}", pending, take_chars(trimmed, max_title).trim());
                    buffer.clear();
                    continue;
                }

                if first_match_found {
                    if let Some(chapter) = self.finish_chapter(
                        &regex,
                        candidate_only,
                        chapters.len() as u32,
                        &current_title,
                        &current_subtitle,
                        &buffer,
                        chapter_start,
                        &mut carry_prefix,
                    ) {
                        chapters.push(chapter);
                    }
                }

                first_match_found = true;
                chapter_start = line.byte_offset;
                current_subtitle.clear();

                if using_candidates {
                    current_title = take_chars(trimmed, max_title).trim().to_string();
                    buffer.clear();
                } else if let Some(m) = matched {
                    let core = trimmed[..m.end()].trim();
                    let tail = trimmed[m.end()..].trim();

                    if tail.chars().count() > self.config.title_tail_limit {
                        // The tail is body text that rode in on the title line.
                        current_title = core.to_string();
                        buffer.clear();
                        buffer.push(tail.to_string());
                    } else {
                        let probe = take_chars(trimmed, self.config.bracket_probe_len);
                        if BRACKET_PROBE.is_match(probe) {
                            pending_title =
                                Some(take_chars(core, max_title).trim().to_string());
                        }
                        // A short tail is the chapter's subtitle; the title
                        // keeps only the matched core.
                        current_title = take_chars(core, max_title).trim().to_string();
                        current_subtitle = tail.to_string();
                        buffer.clear();
                    }
                }
                continue;
            }

            if first_match_found {
                buffer.push(line.text.clone());
                pending_title = None;
            }
        }

        if first_match_found {
            let mut body = buffer.join("\n").trim().to_string();
            if let Some(prefix) = carry_prefix.take() {
                body = format!("{prefix}\n{body}").trim().to_string();
            }
            if !body.is_empty() {
                chapters.push(Chapter::new(
                    chapters.len() as u32,
                    current_title,
                    current_subtitle,
                    body,
                    chapter_start,
                ));
            }
        }

        Ok(chapters)
    }

    /// Boundary-mode split: cut at each boundary's line, yielding exactly
    /// one chapter per boundary.
    pub fn split_by_boundaries(
        &self,
        source: &SourceFile,
        boundaries: &[Boundary],
    ) -> Result<Vec<Chapter>> {
        validate_boundaries(boundaries, source, None)?;

        let mut chapters = Vec::with_capacity(boundaries.len());
        for (i, boundary) in boundaries.iter().enumerate() {
            let start_line = boundary.line_num + 1;
            let end_line = boundaries
                .get(i + 1)
                .map(|next| next.line_num)
                .unwrap_or(source.line_count());

            let body = source.lines[start_line.min(end_line)..end_line]
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();

            if body.is_empty() {
                warn!(
                    "Chapter {} '{}' has empty body (lines {}..{})",
                    i,
                    boundary.text.trim(),
                    start_line,
                    end_line
                );
            }

            chapters.push(Chapter::new(
                i as u32,
                boundary.text.trim(),
                "",
                body,
                boundary.byte_offset,
            ));
        }

        Ok(chapters)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_chapter(
        &self,
        regex: &Regex,
        candidate_only: bool,
        cid: u32,
        title: &str,
        subtitle: &str,
        buffer: &[String],
        chapter_start: u64,
        carry_prefix: &mut Option<String>,
    ) -> Option<Chapter> {
        let mut body = buffer.join("\n").trim().to_string();

        // Strip header-pattern lines from the body, except in candidate
        // mode where the permissive pattern would erase everything.
        if !candidate_only {
            body = body
                .lines()
                .filter(|l| !line_matches(regex, l.trim()))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
        }

        if let Some(prefix) = carry_prefix.take() {
            body = format!("{prefix}\n{body}").trim().to_string();
        }

        // A numberless heading with a near-empty body is a decoration, not
        // a chapter; fold it (subtitle included) into the next body.
        let is_micro = body.chars().count() < self.config.min_valid_chapter_len
            && !title.chars().any(|c| c.is_ascii_digit());
        if !candidate_only && is_micro {
            let folded = if subtitle.is_empty() {
                format!("{title}\n{body}")
            } else {
                format!("{title}\n{subtitle}\n{body}")
            };
            *carry_prefix = Some(folded.trim().to_string());
            return None;
        }

        if body.is_empty() {
            return None;
        }
        Some(Chapter::new(
            cid,
            title,
            subtitle,
            body,
            chapter_start,
        ))
    }
}

/// Prefix of `s` up to `n` code points.
fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn source_from(text: &str) -> SourceFile {
        SourceFile::from_bytes(text.as_bytes(), Path::new("f.txt")).unwrap()
    }

    fn numbered_fixture(n: usize) -> SourceFile {
        let mut text = String::new();
        for i in 1..=n {
            text.push_str(&format!("제{i}화 이야기\n"));
            text.push_str(&"본문이 길게 이어집니다. ".repeat(12));
            text.push_str("\n\n");
        }
        source_from(&text)
    }

    #[test]
    fn test_basic_numbered_split() {
        let config = SegmentConfig::default();
        let source = numbered_fixture(5);
        let chapters = Splitter::new(&config)
            .split(&source, r"제\d+화", &[])
            .unwrap();

        assert_eq!(chapters.len(), 5);
        assert_eq!(chapters[0].cid, 0);
        assert_eq!(chapters[4].cid, 4);
        // The short tail is partitioned out of the title as the subtitle
        assert_eq!(chapters[0].title, "제1화");
        assert_eq!(chapters[0].subtitle, "이야기");
        assert!(chapters[0].body.starts_with("본문이"));
        // Strictly increasing start offsets
        for pair in chapters.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
        }
    }

    #[test]
    fn test_title_tail_becomes_body() {
        let config = SegmentConfig::default();
        let long_tail = "그리고 본문이 제목 줄에 바로 붙어서 길게 이어지는 경우입니다";
        let text = format!(
            "제1화 {long_tail}\n남은 본문입니다. 남은 본문입니다. 남은 본문입니다. \
             남은 본문입니다. 남은 본문입니다. 남은 본문입니다. 남은 본문입니다.\n\n제2화\n{}\n",
            "둘째 장 본문. ".repeat(12)
        );
        let source = source_from(&text);
        let chapters = Splitter::new(&config)
            .split(&source, r"제\d+화", &[])
            .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "제1화");
        // A long tail is body, not a subtitle
        assert_eq!(chapters[0].subtitle, "");
        assert!(chapters[0].body.starts_with(long_tail));
    }

    #[test]
    fn test_subtitle_not_duplicated_in_title() {
        let config = SegmentConfig::default();
        let text = format!(
            "제1화 봄의 시작\n{}\n제2화 여름\n{}\n",
            "본문이 길게 이어집니다. ".repeat(12),
            "본문이 길게 이어집니다. ".repeat(12)
        );
        let source = source_from(&text);
        let chapters = Splitter::new(&config)
            .split(&source, r"제\d+화", &[])
            .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "제1화");
        assert_eq!(chapters[0].subtitle, "봄의 시작");
        assert!(!chapters[0].title.contains("봄의 시작"));
        assert_eq!(chapters[1].subtitle, "여름");
    }

    #[test]
    fn test_micro_chapter_fold_carries_subtitle() {
        let config = SegmentConfig::default();
        let body = "본문이 길게 이어집니다. ".repeat(12);
        // "막간 쉼터" is a numberless micro-chapter: title "막간",
        // subtitle "쉼터", a body far under the validity floor.
        let text = format!(
            "제1화 아침\n{body}\n막간 쉼터\n짧은 줄\n\n제2화 저녁\n{body}\n"
        );
        let source = source_from(&text);
        let chapters = Splitter::new(&config)
            .split(&source, r"제\d+화|막간", &[])
            .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "제2화");
        // The folded heading, subtitle, and body all survive in the next
        // chapter's body
        assert!(chapters[1].body.starts_with("막간\n쉼터\n짧은 줄"));
    }

    #[test]
    fn test_multiline_bracket_title_merges() {
        let config = SegmentConfig::default();
        let body = "본문 문장입니다. ".repeat(12);
        let text = format!(
            "[1화]\n첫번째 이야기\n{body}\n\n[2화]\n두번째 이야기\n{body}\n"
        );
        let source = source_from(&text);
        let chapters = Splitter::new(&config)
            .split(&source, r"\[\d+화\]|번째 이야기", &[])
            .unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "[1화] | 첫번째 이야기");
        assert_eq!(chapters[1].title, "[2화] | 두번째 이야기");
    }

    #[test]
    fn test_candidate_only_mode() {
        let config = SegmentConfig::default();
        let body = "아무 표식 없는 본문. ".repeat(10);
        let text = format!("시작하며\n{body}\n중간에서\n{body}\n끝에서\n{body}\n");
        let source = source_from(&text);
        let candidates = vec![
            "시작하며".to_string(),
            "중간에서".to_string(),
            "끝에서".to_string(),
        ];
        let chapters = Splitter::new(&config)
            .split(&source, ".+", &candidates)
            .unwrap();

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "시작하며");
        assert!(!chapters[0].body.is_empty());
    }

    #[test]
    fn test_prelude_before_first_header_discarded() {
        let config = SegmentConfig::default();
        let text = format!(
            "작품 소개글\n서문 몇 줄\n\n제1화 출발\n{}\n",
            "본문. ".repeat(40)
        );
        let source = source_from(&text);
        let chapters = Splitter::new(&config)
            .split(&source, r"제\d+화", &[])
            .unwrap();

        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].start_offset > 0);
        assert!(!chapters[0].body.contains("작품 소개글"));
    }

    #[test]
    fn test_boundary_mode_exact_count() {
        let config = SegmentConfig::default();
        let source = numbered_fixture(4);
        let matches = match_positions(&source, r"제\d+화").unwrap();
        assert_eq!(matches.len(), 4);

        let boundaries: Vec<Boundary> = matches
            .iter()
            .map(|m| Boundary {
                line_num: m.line_num,
                byte_offset: m.byte_offset,
                text: m.text.clone(),
                score: None,
                source: crate::boundary::BoundarySource::Regex,
            })
            .collect();

        let chapters = Splitter::new(&config)
            .split_by_boundaries(&source, &boundaries)
            .unwrap();
        assert_eq!(chapters.len(), 4);
        assert_eq!(chapters[2].title, "제3화 이야기");
        assert!(chapters[2].body.contains("본문"));
    }

    #[test]
    fn test_boundary_mode_rejects_unsorted() {
        let config = SegmentConfig::default();
        let source = numbered_fixture(3);
        let boundaries = vec![
            Boundary {
                line_num: 5,
                byte_offset: 100,
                text: "b".into(),
                score: None,
                source: crate::boundary::BoundarySource::Manual,
            },
            Boundary {
                line_num: 1,
                byte_offset: 10,
                text: "a".into(),
                score: None,
                source: crate::boundary::BoundarySource::Manual,
            },
        ];
        assert!(matches!(
            Splitter::new(&config).split_by_boundaries(&source, &boundaries),
            Err(Error::InvalidBoundary(_))
        ));
    }

    #[test]
    fn test_coverage_stats() {
        let source = numbered_fixture(10);
        let stats = verify_coverage(&source, r"제\d+화").unwrap();
        assert_eq!(stats.match_count, 10);
        assert!(stats.coverage_ok);
        assert!(stats.last_match_ratio > 0.8);

        let sparse = verify_coverage(&source, r"제1화").unwrap();
        assert_eq!(sparse.match_count, 1);
    }

    #[test]
    fn test_drop_close_duplicates() {
        let positions = [0u64, 200, 10_000, 10_300, 20_000];
        let matches: Vec<PatternMatch> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| PatternMatch {
                line_num: i * 5,
                byte_offset: p,
                text: format!("< Chapter {} >", i),
            })
            .collect();

        let kept = drop_close_duplicates(&matches, 500);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].byte_offset, 0);
        assert_eq!(kept[1].byte_offset, 10_000);
        assert_eq!(kept[2].byte_offset, 20_000);
    }

    #[test]
    fn test_invalid_pattern_is_unusable() {
        let source = numbered_fixture(2);
        assert!(matches!(
            match_positions(&source, "(["),
            Err(Error::PatternUnusable(_))
        ));
    }
}
