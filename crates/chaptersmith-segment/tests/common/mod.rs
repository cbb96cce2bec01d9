//! Shared fixture builders for the scenario suites.
#![allow(dead_code)]

use std::path::Path;

use chaptersmith_segment::SourceFile;

/// Spell a number with Hangul digit names, for titles that must carry no
/// ASCII digits.
pub fn hangul_number(mut n: usize) -> String {
    const DIGITS: [&str; 10] = ["영", "일", "이", "삼", "사", "오", "육", "칠", "팔", "구"];
    if n == 0 {
        return DIGITS[0].to_string();
    }
    let mut out = String::new();
    let mut parts = Vec::new();
    while n > 0 {
        parts.push(DIGITS[n % 10]);
        n /= 10;
    }
    for part in parts.iter().rev() {
        out.push_str(part);
    }
    out
}

pub fn body_block(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str("아침 햇살이 창문을 넘어 방 안 깊숙이 스며들고 있었다 그 빛 속에서 하루가 천천히 깨어났다");
        if i % 3 == 0 {
            out.push_str(" 그리고 이야기는 계속 이어졌다");
        }
        out.push('\n');
    }
    out
}

pub fn source_from(text: &str) -> SourceFile {
    SourceFile::from_bytes(text.as_bytes(), Path::new("fixture.txt")).unwrap()
}

/// `n` chapters headed `제i화 …` with multi-line bodies.
pub fn clean_numbered(n: usize, body_lines: usize) -> String {
    let mut text = String::new();
    for i in 1..=n {
        text.push_str(&format!("제{i}화 새로운 아침\n"));
        text.push_str(&body_block(body_lines));
        text.push('\n');
    }
    text
}

/// A batch scorer reply awarding `score` to every candidate index.
pub fn uniform_scores(batch: usize, score: &str) -> String {
    (1..=batch)
        .map(|i| format!("{i}: {score}"))
        .collect::<Vec<_>>()
        .join("\n")
}
