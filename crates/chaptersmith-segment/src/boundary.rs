//! Boundary and candidate types shared by the escalation pipeline.

use chaptersmith_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::source::SourceFile;

/// Where a boundary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundarySource {
    Regex,
    Structural,
    AiDirect,
    Topic,
    Manual,
}

/// A selected line position that starts a new chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boundary {
    pub line_num: usize,
    pub byte_offset: u64,
    /// The title line as it appears in the file. Never empty.
    pub text: String,
    pub score: Option<f32>,
    pub source: BoundarySource,
}

/// A boundary candidate moving through structural analysis, AI scoring,
/// and global optimization.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub line_num: usize,
    pub byte_offset: u64,
    pub text: String,
    pub structural: f32,
    pub ai: Option<f32>,
    pub source: BoundarySource,
}

impl Candidate {
    /// Weighted combination used for final selection: the AI score carries
    /// 70%, structure 30%; without an AI score the structural score stands
    /// in for both.
    pub fn combined_score(&self) -> f32 {
        let ai = self.ai.unwrap_or(self.structural);
        ai * 0.7 + self.structural * 0.3
    }
}

/// Validate a boundary set before boundary-mode splitting: strictly
/// increasing in-range line numbers, non-empty title text, and (when the
/// caller supplies one) the exact expected size.
pub fn validate_boundaries(
    boundaries: &[Boundary],
    source: &SourceFile,
    expected: Option<usize>,
) -> Result<()> {
    if boundaries.is_empty() {
        return Err(Error::InvalidBoundary("no boundaries provided".into()));
    }
    if let Some(expected) = expected {
        if boundaries.len() != expected {
            return Err(Error::InvalidBoundary(format!(
                "boundary count {} does not match expected {}",
                boundaries.len(),
                expected
            )));
        }
    }

    let line_count = source.line_count();
    for (i, boundary) in boundaries.iter().enumerate() {
        if boundary.line_num >= line_count {
            return Err(Error::InvalidBoundary(format!(
                "boundary {i} line {} out of range (file has {line_count} lines)",
                boundary.line_num
            )));
        }
        if boundary.text.trim().is_empty() {
            return Err(Error::InvalidBoundary(format!(
                "boundary {i} at line {} has empty text",
                boundary.line_num
            )));
        }
        if i > 0 && boundary.line_num <= boundaries[i - 1].line_num {
            return Err(Error::InvalidBoundary(format!(
                "boundary {i} line {} not after line {}",
                boundary.line_num,
                boundaries[i - 1].line_num
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn boundary(line_num: usize, byte_offset: u64, text: &str) -> Boundary {
        Boundary {
            line_num,
            byte_offset,
            text: text.into(),
            score: None,
            source: BoundarySource::Manual,
        }
    }

    fn fixture() -> SourceFile {
        SourceFile::from_bytes(
            "제1화\nbody\n제2화\nbody\n제3화\nbody\n".as_bytes(),
            Path::new("f.txt"),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_set() {
        let source = fixture();
        let set = vec![boundary(0, 0, "제1화"), boundary(2, 13, "제2화"), boundary(4, 26, "제3화")];
        assert!(validate_boundaries(&set, &source, Some(3)).is_ok());
    }

    #[test]
    fn test_unsorted_rejected() {
        let source = fixture();
        let set = vec![boundary(2, 13, "제2화"), boundary(0, 0, "제1화")];
        assert!(matches!(
            validate_boundaries(&set, &source, None),
            Err(Error::InvalidBoundary(_))
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let source = fixture();
        let set = vec![boundary(99, 0, "제1화")];
        assert!(validate_boundaries(&set, &source, None).is_err());
    }

    #[test]
    fn test_empty_text_rejected() {
        let source = fixture();
        let set = vec![boundary(0, 0, "  ")];
        assert!(validate_boundaries(&set, &source, None).is_err());
    }

    #[test]
    fn test_wrong_count_rejected() {
        let source = fixture();
        let set = vec![boundary(0, 0, "제1화")];
        assert!(validate_boundaries(&set, &source, Some(2)).is_err());
    }

    #[test]
    fn test_combined_score_weights() {
        let candidate = Candidate {
            line_num: 0,
            byte_offset: 0,
            text: "t".into(),
            structural: 0.4,
            ai: Some(0.9),
            source: BoundarySource::Structural,
        };
        assert!((candidate.combined_score() - (0.9 * 0.7 + 0.4 * 0.3)).abs() < 1e-6);

        let unscored = Candidate {
            ai: None,
            ..candidate
        };
        assert!((unscored.combined_score() - 0.4).abs() < 1e-6);
    }
}
