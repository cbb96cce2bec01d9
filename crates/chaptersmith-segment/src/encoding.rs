//! Byte-level encoding detection for the corpus encodings.
//!
//! The collection mixes UTF-8 (with and without BOM), UTF-16, EUC-KR/CP949,
//! GB18030, and Shift-JIS. Detection sniffs at most the first 256 KiB and
//! never fails: ambiguous input falls back to UTF-8, then EUC-KR, and all
//! downstream decoding uses replacement.

use encoding_rs::{Encoding, EUC_KR, GB18030, SHIFT_JIS, UTF_16BE, UTF_16LE, UTF_8};

/// How many leading bytes detection examines.
pub const SNIFF_LIMIT: usize = 256 * 1024;

/// Confidence below which the UTF-8-then-EUC-KR preference applies.
pub const AMBIGUITY_FLOOR: f32 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub encoding: &'static Encoding,
    pub confidence: f32,
}

/// Detect the most plausible encoding of `bytes`.
pub fn detect(bytes: &[u8]) -> Detection {
    let probe = &bytes[..bytes.len().min(SNIFF_LIMIT)];

    if probe.is_empty() {
        return Detection {
            encoding: UTF_8,
            confidence: 1.0,
        };
    }

    // A BOM is authoritative.
    if let Some((encoding, _)) = Encoding::for_bom(probe) {
        return Detection {
            encoding,
            confidence: 1.0,
        };
    }

    // Strict UTF-8 validation. A truncated trailing sequence at the probe
    // edge still counts as valid.
    match std::str::from_utf8(probe) {
        Ok(_) => {
            return Detection {
                encoding: UTF_8,
                confidence: 0.99,
            }
        }
        Err(e) if e.error_len().is_none() && probe.len() == SNIFF_LIMIT => {
            return Detection {
                encoding: UTF_8,
                confidence: 0.95,
            }
        }
        Err(_) => {}
    }

    // UTF-16 shows up as NUL bytes concentrated on one byte parity.
    if let Some(detection) = detect_utf16(probe) {
        return detection;
    }

    // Trial-decode the East Asian candidates and score the results.
    let mut best = Detection {
        encoding: EUC_KR,
        confidence: 0.0,
    };
    for encoding in [EUC_KR, GB18030, SHIFT_JIS] {
        let confidence = trial_decode_score(probe, encoding);
        if confidence > best.confidence {
            best = Detection {
                encoding,
                confidence,
            };
        }
    }

    if best.confidence < AMBIGUITY_FLOOR {
        // Too uncertain to trust the trial scores. UTF-8 already failed
        // validation here, so the corpus prior says EUC-KR.
        return Detection {
            encoding: EUC_KR,
            confidence: best.confidence.max(0.3),
        };
    }

    best
}

fn detect_utf16(probe: &[u8]) -> Option<Detection> {
    if probe.len() < 4 {
        return None;
    }
    let even_nuls = probe.iter().step_by(2).filter(|b| **b == 0).count();
    let odd_nuls = probe.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
    let half = probe.len() / 2;
    if half == 0 {
        return None;
    }

    // ASCII-heavy UTF-16 text has NULs in the high byte of most units.
    if odd_nuls * 100 / half > 30 && even_nuls * 100 / half < 5 {
        return Some(Detection {
            encoding: UTF_16LE,
            confidence: 0.8,
        });
    }
    if even_nuls * 100 / half > 30 && odd_nuls * 100 / half < 5 {
        return Some(Detection {
            encoding: UTF_16BE,
            confidence: 0.8,
        });
    }
    None
}

/// Score a candidate encoding by decoding the probe: replacement characters
/// disqualify quickly, and the yield of script-appropriate characters
/// separates the remaining candidates.
fn trial_decode_score(probe: &[u8], encoding: &'static Encoding) -> f32 {
    let (text, _, had_errors) = encoding.decode(probe);

    let mut total = 0usize;
    let mut replacements = 0usize;
    let mut script_hits = 0usize;

    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' {
            replacements += 1;
        } else if is_script_char(c, encoding) {
            script_hits += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }

    let replacement_ratio = replacements as f32 / total as f32;
    if had_errors && replacement_ratio > 0.02 {
        return 0.0;
    }

    let script_ratio = script_hits as f32 / total as f32;
    (1.0 - replacement_ratio * 10.0).max(0.0) * (0.5 + script_ratio).min(1.0)
}

fn is_script_char(c: char, encoding: &'static Encoding) -> bool {
    let hangul = ('\u{AC00}'..='\u{D7A3}').contains(&c);
    let cjk = ('\u{4E00}'..='\u{9FFF}').contains(&c);
    let kana = ('\u{3040}'..='\u{30FF}').contains(&c);

    if encoding == EUC_KR {
        hangul
    } else if encoding == SHIFT_JIS {
        kana || cjk
    } else {
        cjk || hangul
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_plain() {
        let d = detect("제1화 소설의 시작\n본문입니다.\n".as_bytes());
        assert_eq!(d.encoding, UTF_8);
        assert!(d.confidence > 0.9);
    }

    #[test]
    fn test_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("chapter one\n".as_bytes());
        let d = detect(&bytes);
        assert_eq!(d.encoding, UTF_8);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let d = detect(&bytes);
        assert_eq!(d.encoding, UTF_16LE);
    }

    #[test]
    fn test_utf16le_without_bom() {
        let mut bytes = Vec::new();
        for unit in "plain ascii text over several words\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let d = detect(&bytes);
        assert_eq!(d.encoding, UTF_16LE);
    }

    #[test]
    fn test_euc_kr() {
        let (encoded, _, _) = EUC_KR.encode("제1화 주인공의 하루가 시작되었다.\n오늘도 평화로운 마을이었다.\n");
        let d = detect(&encoded);
        assert_eq!(d.encoding, EUC_KR);
        assert!(d.confidence >= AMBIGUITY_FLOOR || d.encoding == EUC_KR);
    }

    #[test]
    fn test_empty_never_fails() {
        let d = detect(&[]);
        assert_eq!(d.encoding, UTF_8);
    }
}
