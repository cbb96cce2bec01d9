//! Cross-cutting properties: count discipline, degradation, determinism.

mod common;

use std::sync::Arc;

use chaptersmith_core::{Error, SegmentConfig};
use chaptersmith_oracle::{
    CachedOracle, FailingOracle, ResponseCache, ScriptedOracle, TextOracle,
};
use chaptersmith_segment::SplitRunner;
use tokio_util::sync::CancellationToken;

use common::{body_block, clean_numbered, source_from, uniform_scores};

fn runner(oracle: Arc<dyn TextOracle>) -> SplitRunner {
    SplitRunner::new(oracle, SegmentConfig::default())
}

#[tokio::test]
async fn expected_one_yields_whole_file() {
    // Prose with no recognizable markers at all
    let source = source_from(&body_block(200));
    let result = runner(Arc::new(FailingOracle))
        .run_source(&source, 1, None)
        .await
        .unwrap();

    assert_eq!(result.chapters.len(), 1);
    assert_eq!(result.chapters[0].cid, 0);
    assert_eq!(result.chapters[0].title, "");
    assert!(result.chapters[0].body.contains("아침 햇살이"));
}

#[tokio::test]
async fn empty_file_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, "").unwrap();

    let failure = runner(Arc::new(FailingOracle))
        .run(&path, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(failure.error, Error::InvalidInput(_)));
    assert!(failure.partial.is_empty());
}

#[tokio::test]
async fn zero_expected_is_invalid_input() {
    let source = source_from(&clean_numbered(3, 6));
    let failure = runner(Arc::new(FailingOracle))
        .run_source(&source, 0, None)
        .await
        .unwrap_err();
    assert!(matches!(failure.error, Error::InvalidInput(_)));
}

/// An off-by-one expectation must fail loudly, never silently return
/// `expected ± 1`.
#[tokio::test]
async fn off_by_one_fails_stagnated() {
    let mut text = String::from("소설 전체 제목\n\n");
    text.push_str(&clean_numbered(10, 30));
    let source = source_from(&text);

    let oracle = Arc::new(
        ScriptedOracle::new()
            .rule("chapter_pattern_analysis", r"^제\d+화")
            .rule("gap_pattern_refinement", "NO_PATTERN_FOUND")
            .rule("direct_title_search", "NO_TITLES_FOUND")
            .rule("chapter_title_likelihood", &uniform_scores(10, "0.9"))
            .rule("topic_change_detection", "0.1"),
    );

    let failure = runner(oracle)
        .run_source(&source, 11, None)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        Error::Stagnated {
            got: 10,
            expected: 11
        }
    ));
    assert_eq!(failure.partial.len(), 10);
}

/// A warm cache makes reruns byte-identical.
#[tokio::test]
async fn idempotent_under_warm_cache() {
    let source = source_from(&clean_numbered(10, 12));

    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResponseCache::open(dir.path()).unwrap());
    let scripted: Arc<dyn TextOracle> =
        Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"^제\d+화"));
    let oracle: Arc<dyn TextOracle> = Arc::new(CachedOracle::new(scripted, cache));

    let first = runner(oracle.clone())
        .run_source(&source, 10, None)
        .await
        .unwrap();
    let second = runner(oracle)
        .run_source(&source, 10, None)
        .await
        .unwrap();

    assert_eq!(first.chapters.len(), second.chapters.len());
    for (a, b) in first.chapters.iter().zip(second.chapters.iter()) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.subtitle, b.subtitle);
        assert_eq!(a.body, b.body);
        assert_eq!(a.start_offset, b.start_offset);
    }
    // The analysis response was persisted
    assert!(std::fs::read_dir(dir.path()).unwrap().count() >= 1);
}

/// Every non-blank source line after the prelude survives into titles or
/// bodies.
#[tokio::test]
async fn round_trip_preserves_content_lines() {
    let mut text = String::from("작품 소개\n서문 몇 줄\n\n");
    text.push_str(&clean_numbered(10, 12));
    let source = source_from(&text);

    let oracle = Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"^제\d+화"));
    let result = runner(oracle).run_source(&source, 10, None).await.unwrap();

    let first_offset = result.chapters[0].start_offset;
    let haystack: String = result
        .chapters
        .iter()
        .map(|c| {
            // A subtitle was partitioned off the header line; rejoin it
            // for reconstruction.
            let header = if c.subtitle.is_empty() {
                c.title.clone()
            } else {
                format!("{} {}", c.title, c.subtitle)
            };
            format!("{header}\n{}", c.body)
        })
        .collect::<Vec<_>>()
        .join("\n");

    for line in source.lines.iter() {
        if line.byte_offset < first_offset {
            continue;
        }
        let trimmed = line.text.trim();
        if !trimmed.is_empty() {
            assert!(
                haystack.contains(trimmed),
                "line lost in round trip: {trimmed}"
            );
        }
    }
}

#[tokio::test]
async fn cancellation_yields_no_partial() {
    let source = source_from(&clean_numbered(10, 12));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let oracle: Arc<dyn TextOracle> =
        Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"^제\d+화"));
    let failure = SplitRunner::new(oracle, SegmentConfig::default())
        .with_cancellation(cancel)
        .run_source(&source, 10, None)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, Error::Cancelled));
    assert!(failure.partial.is_empty());
}

/// Hinted end markers extend the deterministic repair vocabulary.
#[tokio::test]
async fn hinted_end_markers_apply() {
    let mut text = String::new();
    for i in 1..=12usize {
        text.push_str(&format!("< 장면 {i} >\n"));
        text.push_str(&body_block(8));
        text.push_str(&format!("< 장면 {i} > 이상\n─ ─ ─\n\n"));
    }
    let source = source_from(&text);

    let hints = chaptersmith_core::MetadataHints {
        known_end_markers: vec!["이상".into()],
        ..Default::default()
    };
    let oracle = Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"<\s*.*?\s*>"));

    let result = runner(oracle)
        .run_source(&source, 12, Some(&hints))
        .await
        .unwrap();
    assert_eq!(result.chapters.len(), 12);
    assert!(result.chapters.iter().all(|c| !c.title.contains("이상")));
}
