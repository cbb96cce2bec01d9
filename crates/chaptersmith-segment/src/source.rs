//! Decoded source text with a raw byte-offset line table.
//!
//! Every component computes boundaries in raw-file byte space. Decoding the
//! file once into per-line records (text plus raw offset and length) keeps
//! code-point arithmetic and byte arithmetic from ever mixing.

use std::path::{Path, PathBuf};

use chaptersmith_core::{Error, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use crate::encoding::detect;

/// One physical line: decoded text without its terminator, plus where the
/// line starts in the raw file and how many raw bytes it spans including
/// the terminator.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub text: String,
    pub byte_offset: u64,
    pub byte_len: u32,
}

/// A file decoded once for the duration of a segmentation run.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub encoding: &'static Encoding,
    pub raw_len: u64,
    pub lines: Vec<SourceLine>,
}

impl SourceFile {
    /// Read and decode a file. Empty files are rejected; undecodable
    /// content (mostly replacement characters even under the UTF-8
    /// fallback) is `EncodingUndetermined`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&bytes, path)
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{}: file is empty",
                path.display()
            )));
        }

        let detection = detect(bytes);
        let lines = if detection.encoding == UTF_16LE || detection.encoding == UTF_16BE {
            build_lines_utf16(bytes, detection.encoding)
        } else {
            build_lines_bytewise(bytes, detection.encoding)
        };

        let source = Self {
            path: path.to_path_buf(),
            encoding: detection.encoding,
            raw_len: bytes.len() as u64,
            lines,
        };

        if source.is_mostly_replacement() {
            return Err(Error::EncodingUndetermined(format!(
                "{}: text is unreadable as {}",
                path.display(),
                source.encoding.name()
            )));
        }

        Ok(source)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Index of the first line starting at or after `offset`. Mirrors the
    /// seek-then-discard-partial-line sampling strategy: a position inside
    /// a line resolves to the next whole line.
    pub fn line_index_at(&self, offset: u64) -> usize {
        self.lines
            .partition_point(|line| line.byte_offset < offset)
            .min(self.lines.len().saturating_sub(1))
    }

    /// The whole decoded text joined with `\n`. Used by components that
    /// window over characters rather than lines.
    pub fn joined_text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&line.text);
        }
        out
    }

    fn is_mostly_replacement(&self) -> bool {
        let mut total = 0usize;
        let mut bad = 0usize;
        for line in self.lines.iter().take(2000) {
            for c in line.text.chars() {
                total += 1;
                if c == '\u{FFFD}' {
                    bad += 1;
                }
            }
        }
        total > 0 && bad * 2 > total
    }
}

/// Line scan for encodings whose multi-byte sequences never contain the
/// ASCII terminator bytes (UTF-8, EUC-KR, GB18030, Shift-JIS).
fn build_lines_bytewise(bytes: &[u8], encoding: &'static Encoding) -> Vec<SourceLine> {
    let bom_len = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        3
    } else {
        0
    };

    let mut lines = Vec::new();
    let mut start = bom_len;
    let mut i = bom_len;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\n' || b == b'\r' {
            let term_len = if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                2
            } else {
                1
            };
            push_line(&mut lines, bytes, encoding, start, i, term_len);
            i += term_len;
            start = i;
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        push_line(&mut lines, bytes, encoding, start, bytes.len(), 0);
    }

    lines
}

fn push_line(
    lines: &mut Vec<SourceLine>,
    bytes: &[u8],
    encoding: &'static Encoding,
    start: usize,
    end: usize,
    term_len: usize,
) {
    let (text, _) = encoding.decode_without_bom_handling(&bytes[start..end]);
    lines.push(SourceLine {
        text: text.into_owned(),
        byte_offset: start as u64,
        byte_len: (end - start + term_len) as u32,
    });
}

/// Line table for UTF-16: decode once, then recover raw byte spans from
/// UTF-16 unit counts (2 bytes per unit).
fn build_lines_utf16(bytes: &[u8], encoding: &'static Encoding) -> Vec<SourceLine> {
    let (text, _, _) = encoding.decode(bytes);
    let bom_len: u64 = match bytes {
        [0xFF, 0xFE, ..] | [0xFE, 0xFF, ..] => 2,
        _ => 0,
    };

    let mut lines = Vec::new();
    let mut offset = bom_len;
    let mut current = String::new();
    let mut current_units: u64 = 0;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            let byte_len = (current_units + 1) * 2;
            lines.push(SourceLine {
                text: std::mem::take(&mut current),
                byte_offset: offset,
                byte_len: byte_len as u32,
            });
            offset += byte_len;
            current_units = 0;
        } else if c == '\r' {
            let term_units: u64 = if chars.peek() == Some(&'\n') {
                chars.next();
                2
            } else {
                1
            };
            let byte_len = (current_units + term_units) * 2;
            lines.push(SourceLine {
                text: std::mem::take(&mut current),
                byte_offset: offset,
                byte_len: byte_len as u32,
            });
            offset += byte_len;
            current_units = 0;
        } else {
            current_units += c.len_utf16() as u64;
            current.push(c);
        }
    }
    if !current.is_empty() {
        let byte_len = current_units * 2;
        lines.push(SourceLine {
            text: current,
            byte_offset: offset,
            byte_len: byte_len as u32,
        });
    }

    lines
}
