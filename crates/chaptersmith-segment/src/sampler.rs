//! Representative sampling of large files.
//!
//! All windows are line-aligned and carry their raw byte range, so anything
//! learned from a sample can be mapped straight back onto the file.

use crate::source::SourceFile;

/// Separator inserted between non-adjacent windows when samples are joined
/// into one prompt.
pub const SAMPLE_SKIP_MARKER: &str = "[...SAMPLE_SKIP...]";

#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub start_byte: u64,
    pub end_byte: u64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ThreeWindows {
    pub head: SampleWindow,
    pub middle: SampleWindow,
    pub tail: SampleWindow,
}

impl ThreeWindows {
    pub fn joined(&self) -> String {
        join_windows(&[self.head.clone(), self.middle.clone(), self.tail.clone()])
    }
}

/// Head, middle, and tail windows of at most `window_bytes` each.
pub fn head_middle_tail(source: &SourceFile, window_bytes: usize) -> ThreeWindows {
    let head = window_from(source, 0, window_bytes);
    let middle_target = (source.raw_len / 2).saturating_sub(window_bytes as u64 / 2);
    let middle = window_from(source, source.line_index_at(middle_target), window_bytes);
    let tail_target = source.raw_len.saturating_sub(window_bytes as u64);
    let tail = window_from(source, source.line_index_at(tail_target), window_bytes);
    ThreeWindows { head, middle, tail }
}

/// Up to `radius` raw bytes on each side of `byte_offset`, line-aligned.
pub fn extract_around(source: &SourceFile, byte_offset: u64, radius: u64) -> SampleWindow {
    let start = byte_offset.saturating_sub(radius);
    let budget = (radius * 2).min(source.raw_len - start.min(source.raw_len));
    window_from(source, source.line_index_at(start), budget as usize)
}

/// `k` windows at equal byte strides across the file. A file small enough
/// to fit 1.5× the total budget is returned whole.
pub fn uniform_samples(source: &SourceFile, k: usize, window_bytes: usize) -> Vec<SampleWindow> {
    let k = k.max(1);
    let total_budget = (k * window_bytes) as u64;

    if source.raw_len * 2 <= total_budget * 3 {
        return vec![window_from(source, 0, source.raw_len as usize)];
    }

    let stride = source.raw_len / k as u64;
    let mut windows: Vec<SampleWindow> = Vec::with_capacity(k);

    for i in 0..k {
        let target = i as u64 * stride;
        let mut start_line = source.line_index_at(target);

        // Never re-cover ground a previous window already holds.
        if let Some(prev) = windows.last() {
            let next_free = source.line_index_at(prev.end_byte);
            if source.lines[next_free].byte_offset < prev.end_byte {
                continue;
            }
            start_line = start_line.max(next_free);
        }

        let window = window_from(source, start_line, window_bytes);
        if windows
            .last()
            .map(|prev| window.start_byte >= prev.end_byte)
            .unwrap_or(true)
        {
            windows.push(window);
        }
    }

    windows
}

/// Join windows for a prompt, marking every discontinuity.
pub fn join_windows(windows: &[SampleWindow]) -> String {
    let mut out = String::new();
    let mut last_end = None;

    for window in windows {
        if let Some(end) = last_end {
            if window.start_byte > end {
                out.push_str("\n\n");
                out.push_str(SAMPLE_SKIP_MARKER);
                out.push_str("\n\n");
            } else {
                out.push('\n');
            }
        }
        out.push_str(&window.text);
        last_end = Some(window.end_byte);
    }

    out
}

/// Accumulate whole lines from `start_line` until `byte_budget` raw bytes
/// are covered. Always takes at least one line.
fn window_from(source: &SourceFile, start_line: usize, byte_budget: usize) -> SampleWindow {
    let start_line = start_line.min(source.lines.len().saturating_sub(1));
    let start_byte = source.lines[start_line].byte_offset;

    let mut text = String::new();
    let mut end_byte = start_byte;

    for (i, line) in source.lines[start_line..].iter().enumerate() {
        let next_end = line.byte_offset + line.byte_len as u64;
        if i > 0 && next_end - start_byte > byte_budget as u64 {
            break;
        }
        if i > 0 {
            text.push('\n');
        }
        text.push_str(&line.text);
        end_byte = next_end;
    }

    SampleWindow {
        start_byte,
        end_byte,
        text,
    }
}
