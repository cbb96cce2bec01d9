//! Chapter records and title-based classification.

use serde::{Deserialize, Serialize};

/// Classification of a chapter by its title keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    Main,
    Side,
    Epilogue,
    Prologue,
    Other,
}

/// Keyword tables per classification, checked in order: an author's-note
/// heading beats an epilogue heading when both lexemes appear.
const AUTHOR_NOTE_KEYWORDS: &[&str] = &["작가의 말", "작가 후기", "후기", "author's note"];
const EPILOGUE_KEYWORDS: &[&str] = &["에필로그", "epilogue", "후일담", "종장", "终章"];
const PROLOGUE_KEYWORDS: &[&str] = &["프롤로그", "prologue", "서장", "서문", "序章"];
const SIDE_KEYWORDS: &[&str] = &["외전", "번외", "특별편", "side story", "番外"];

/// One segmented chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Dense, zero-based chapter index within the file.
    pub cid: u32,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    /// Body length in code points.
    pub length: usize,
    pub chapter_type: ChapterType,
    /// Raw-file byte offset of the chapter's title line (or of the body
    /// when no title line exists).
    pub start_offset: u64,
}

impl Chapter {
    pub fn new(
        cid: u32,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        body: impl Into<String>,
        start_offset: u64,
    ) -> Self {
        let title = title.into();
        let subtitle = subtitle.into();
        let body = body.into();
        // Classify over the whole header line; the subtitle is the part
        // of it partitioned off the matched title.
        let chapter_type = if subtitle.is_empty() {
            classify_title(&title)
        } else {
            classify_title(&format!("{title} {subtitle}"))
        };
        let length = body.chars().count();
        Self {
            cid,
            title,
            subtitle,
            body,
            length,
            chapter_type,
            start_offset,
        }
    }
}

/// Classify a title line by keyword.
pub fn classify_title(title: &str) -> ChapterType {
    let lowered = title.to_lowercase();

    let contains_any = |keywords: &[&str]| keywords.iter().any(|kw| lowered.contains(kw));

    if contains_any(AUTHOR_NOTE_KEYWORDS) {
        ChapterType::Other
    } else if contains_any(EPILOGUE_KEYWORDS) {
        ChapterType::Epilogue
    } else if contains_any(PROLOGUE_KEYWORDS) {
        ChapterType::Prologue
    } else if contains_any(SIDE_KEYWORDS) {
        ChapterType::Side
    } else {
        ChapterType::Main
    }
}
