//! The escalation-ladder scenarios, end to end against a scripted oracle.

mod common;

use std::sync::Arc;

use chaptersmith_core::{Error, SegmentConfig};
use chaptersmith_oracle::{FailingOracle, ScriptedOracle, TextOracle};
use chaptersmith_segment::log::Stage;
use chaptersmith_segment::SplitRunner;

use common::{body_block, clean_numbered, hangul_number, source_from, uniform_scores};

fn runner(oracle: Arc<dyn TextOracle>) -> SplitRunner {
    SplitRunner::new(oracle, SegmentConfig::default())
}

/// Scenario 1: clean numbered chapters, one-shot success.
#[tokio::test]
async fn clean_numbered_one_shot() {
    let source = source_from(&clean_numbered(100, 12));
    let oracle = Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"^제\d+화"));

    let result = runner(oracle).run_source(&source, 100, None).await.unwrap();

    assert_eq!(result.chapters.len(), 100);
    for (i, chapter) in result.chapters.iter().enumerate() {
        assert_eq!(chapter.cid as usize, i);
        assert_eq!(chapter.title, format!("제{}화", i + 1));
        assert_eq!(chapter.subtitle, "새로운 아침");
        assert!(!chapter.body.is_empty());
    }
    // Strictly increasing byte offsets
    for pair in result.chapters.windows(2) {
        assert!(pair[1].start_offset > pair[0].start_offset);
    }
    assert_eq!(result.log.stage_events(Stage::PatternAcquire).count(), 1);
    assert_eq!(result.log.stage_events(Stage::Done).count(), 1);
}

/// Scenario 2: paired start/end markers. The raw pattern hits 740 lines;
/// the deterministic end-marker filter repairs the count to 370.
#[tokio::test]
async fn paired_end_markers_repaired() {
    let mut text = String::new();
    for i in 1..=370 {
        text.push_str(&format!("< 에피소드 {i} >\n"));
        text.push_str(&body_block(8));
        text.push_str(&format!("< 에피소드 {i} > 끝\n─ ─ ─\n\n"));
    }
    let source = source_from(&text);
    let oracle = Arc::new(ScriptedOracle::new().rule("chapter_pattern_analysis", r"<\s*.*?\s*>"));

    let result = runner(oracle).run_source(&source, 370, None).await.unwrap();

    assert_eq!(result.chapters.len(), 370);
    assert!(result
        .chapters
        .iter()
        .all(|c| c.title.starts_with("< 에피소드") && !c.title.contains('끝')));

    let repair = result
        .log
        .stage_events(Stage::AutoRepair)
        .next()
        .expect("auto-repair event");
    assert!(repair.action.contains("end-marker-filter"));
    assert_eq!(repair.after_count, 370);
}

/// Scenario 3: numbered/numberless mix. The numbered pattern finds 317;
/// direct search plus reverse-regex synthesis reveal the 53 numberless
/// headers.
#[tokio::test]
async fn numberless_mix_via_direct_search() {
    let mut titles: Vec<String> = Vec::new();
    let mut text = String::new();
    for i in 1..=370usize {
        let title = if i % 7 == 3 {
            format!("< 막간 이야기 {} >", hangul_number(i))
        } else {
            format!("< 에피소드({i}) >")
        };
        text.push_str(&title);
        text.push('\n');
        text.push_str(&body_block(6));
        text.push('\n');
        titles.push(title);
    }
    assert_eq!(titles.iter().filter(|t| t.contains("막간")).count(), 53);

    let source = source_from(&text);
    let oracle = Arc::new(
        ScriptedOracle::new()
            .rule("chapter_pattern_analysis", r"<\s*에피소드\(\d+\)\s*>")
            .rule("gap_pattern_refinement", "NO_PATTERN_FOUND")
            .rule("direct_title_search", &titles.join("\n"))
            .rule("reverse_pattern_extraction", r"^<\s*.+\s*>$"),
    );

    let result = runner(oracle).run_source(&source, 370, None).await.unwrap();

    assert_eq!(result.chapters.len(), 370);
    assert!(result
        .chapters
        .iter()
        .any(|c| c.title.starts_with("< 막간 이야기")));
    assert!(result
        .log
        .stage_events(Stage::DirectSearch)
        .any(|e| e.action == "reverse-pattern-exact"));
}

/// Scenario 4: stagnation. Gap refinement cannot move the count, the
/// stagnation rule escalates after three flat iterations, and the
/// advanced pipeline recovers the full 100.
#[tokio::test]
async fn stagnation_escalates_to_advanced() {
    let mut text = String::from("소설 전체 제목\n\n");
    let mut hidden = 0usize;
    for i in 1..=100usize {
        // Every seventh heading carries no recognizable marker.
        if i % 7 == 0 {
            hidden += 1;
            text.push_str(&format!("쉬어가는 장면 {}\n", hangul_number(hidden)));
        } else {
            text.push_str(&format!("제{i}화 아침\n"));
        }
        text.push_str(&body_block(30));
        text.push('\n');
    }
    let source = source_from(&text);

    let oracle = Arc::new(
        ScriptedOracle::new()
            .rule("chapter_pattern_analysis", r"^제\d+화")
            .rule("gap_pattern_refinement", "NO_PATTERN_FOUND")
            .rule("direct_title_search", "NO_TITLES_FOUND")
            .rule("chapter_title_likelihood", &uniform_scores(10, "0.9"))
            .rule("topic_change_detection", "0.2"),
    );

    let result = runner(oracle).run_source(&source, 100, None).await.unwrap();

    assert_eq!(result.chapters.len(), 100);
    assert!(result
        .log
        .stage_events(Stage::GapRefine)
        .any(|e| e.action == "stagnation"));
    assert!(result
        .log
        .stage_events(Stage::Advanced)
        .any(|e| e.action == "boundary-split"));
    // The hidden headings were recovered as boundaries
    assert!(result
        .chapters
        .iter()
        .filter(|c| c.title.starts_with("쉬어가는 장면"))
        .count()
        >= 10);
}

/// Scenario 5: rejection streak. Two consecutive refused refinements
/// escalate immediately; the advanced pipeline produces the target count.
#[tokio::test]
async fn rejection_streak_escalates() {
    let mut text = String::from("소설 전체 제목\n\n");
    for i in 1..=85usize {
        text.push_str(&format!("제{i}화 아침\n"));
        text.push_str(&body_block(30));
        text.push('\n');
    }
    // A contiguous markerless block large enough to register as a gap
    for i in 1..=15usize {
        text.push_str(&format!("쉬어가는 장면 {}\n", hangul_number(i)));
        text.push_str(&body_block(50));
        text.push('\n');
    }
    let source = source_from(&text);

    let oracle = Arc::new(
        ScriptedOracle::new()
            .rule("chapter_pattern_analysis", r"^제\d+화")
            .rule("gap_pattern_refinement", "NO_PATTERN_FOUND")
            .rule("direct_title_search", "NO_TITLES_FOUND")
            .rule("chapter_title_likelihood", &uniform_scores(10, "0.9"))
            .rule("topic_change_detection", "0.2"),
    );

    let result = runner(oracle).run_source(&source, 100, None).await.unwrap();

    assert_eq!(result.chapters.len(), 100);
    assert!(result
        .log
        .stage_events(Stage::GapRefine)
        .any(|e| e.action == "rejection-streak"));
    assert!(result
        .log
        .stage_events(Stage::Advanced)
        .any(|e| e.action == "boundary-split"));
}

/// Scenario 6: every oracle call fails. The deterministic ladder still
/// runs off the universal fallback pattern, and the run fails as
/// `OracleUnavailable` with the pattern-only result attached.
#[tokio::test]
async fn oracle_outage_reports_best_effort() {
    let mut text = String::new();
    for i in 1..=20usize {
        text.push_str(&format!("{i}화 아침의 기록\n"));
        text.push_str(&body_block(10));
        text.push('\n');
    }
    let source = source_from(&text);

    let failure = runner(Arc::new(FailingOracle))
        .run_source(&source, 25, None)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, Error::OracleUnavailable(_)));
    assert_eq!(failure.partial.len(), 20);
    assert!(!failure.log.is_empty());
    assert!(failure
        .log
        .stage_events(Stage::PatternAcquire)
        .any(|e| e.action == "universal-fallback"));
}

/// With a matching count the fallback pattern alone completes the run,
/// oracle or no oracle.
#[tokio::test]
async fn oracle_outage_with_matching_count_succeeds() {
    let mut text = String::new();
    for i in 1..=20usize {
        text.push_str(&format!("{i}화 아침의 기록\n"));
        text.push_str(&body_block(10));
        text.push('\n');
    }
    let source = source_from(&text);

    let result = runner(Arc::new(FailingOracle))
        .run_source(&source, 20, None)
        .await
        .unwrap();
    assert_eq!(result.chapters.len(), 20);
}
