/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use pogo_types::{Encoding, FileType, LineEnding};

use crate::error::FileTyperError;

/// Sample size read from the front of a file to drive detection.
pub const SAMPLE_SIZE: usize = 8 * 1024;
/// Files larger than this are refused outright.
pub const MAX_SIZE: u64 = 1024 * 1024 * 1024;

const CONTROL_THRESHOLD: f64 = 0.30;
const PRINTABLE_THRESHOLD: f64 = 0.30;

/// Runs the detection algorithm over a sample drawn from the front of a
/// file, given the file's total size (used only for the size cap; the
/// sample itself is assumed already truncated to at most [`SAMPLE_SIZE`]
/// bytes).
pub fn detect(sample: &[u8], total_size: u64) -> Result<FileType, FileTyperError> {
    if total_size > MAX_SIZE {
        return Err(FileTyperError::TooLarge(MAX_SIZE));
    }
    if total_size == 0 {
        return Ok(FileType::empty());
    }

    let (encoding, bom, body) = detect_encoding(sample);

    let decoded = match decode_to_utf8(body, encoding) {
        Some(s) => s,
        None => {
            // Failed to decode under the detected encoding: treat as binary.
            return Ok(FileType {
                binary: true,
                encoding,
                bom,
                line_ending: LineEnding::Unknown,
            });
        }
    };

    let binary = is_binary(&decoded);
    let line_ending = if binary {
        LineEnding::Unknown
    } else {
        detect_line_ending(&decoded)
    };

    Ok(FileType {
        binary,
        encoding,
        bom,
        line_ending,
    })
}

/// Detects a BOM (checked longest-prefix-first since UTF-16LE's BOM is a
/// prefix of UTF-32LE's), falling back to zero-byte-parity heuristics, then
/// to plain UTF-8 validity. Returns the encoding, whether a BOM was found,
/// and the sample with the BOM stripped.
fn detect_encoding(sample: &[u8]) -> (Encoding, bool, &[u8]) {
    if sample.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return (Encoding::Utf32Be, true, &sample[4..]);
    }
    if sample.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return (Encoding::Utf32Le, true, &sample[4..]);
    }
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (Encoding::Utf8, true, &sample[3..]);
    }
    if sample.starts_with(&[0xFE, 0xFF]) {
        return (Encoding::Utf16Be, true, &sample[2..]);
    }
    if sample.starts_with(&[0xFF, 0xFE]) {
        return (Encoding::Utf16Le, true, &sample[2..]);
    }

    if let Some(enc) = guess_utf32(sample) {
        return (enc, false, sample);
    }
    if let Some(enc) = guess_utf16(sample) {
        return (enc, false, sample);
    }
    if std::str::from_utf8(sample).is_ok() {
        return (Encoding::Utf8, false, sample);
    }
    (Encoding::Unknown, false, sample)
}

/// Counts high-zero bytes at 4-aligned positions: for BMP-range UTF-32LE
/// text the byte at each group's offset 3 is almost always zero; for
/// UTF-32BE it's offset 0.
fn guess_utf32(sample: &[u8]) -> Option<Encoding> {
    let groups = sample.len() / 4;
    if groups < 2 {
        return None;
    }
    let mut le_zero = 0usize;
    let mut be_zero = 0usize;
    for i in 0..groups {
        let g = &sample[i * 4..i * 4 + 4];
        if g[3] == 0 && g[2] == 0 {
            le_zero += 1;
        }
        if g[0] == 0 && g[1] == 0 {
            be_zero += 1;
        }
    }
    let threshold = groups * 9 / 10;
    if le_zero >= threshold {
        Some(Encoding::Utf32Le)
    } else if be_zero >= threshold {
        Some(Encoding::Utf32Be)
    } else {
        None
    }
}

/// Zero-byte parity over a 2-aligned window: for BMP-range UTF-16LE text the
/// high byte of each code unit (offset 1) is usually zero; for UTF-16BE it's
/// offset 0.
fn guess_utf16(sample: &[u8]) -> Option<Encoding> {
    let units = sample.len() / 2;
    if units < 2 {
        return None;
    }
    let mut le_zero = 0usize;
    let mut be_zero = 0usize;
    for i in 0..units {
        let u = &sample[i * 2..i * 2 + 2];
        if u[1] == 0 {
            le_zero += 1;
        }
        if u[0] == 0 {
            be_zero += 1;
        }
    }
    let threshold = units * 9 / 10;
    if le_zero >= threshold {
        Some(Encoding::Utf16Le)
    } else if be_zero >= threshold {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

/// Decodes `body` (already past any BOM) to a UTF-8 `String` under the given
/// encoding. Returns `None` on malformed input, which the caller treats as
/// binary.
pub(crate) fn decode_to_utf8(body: &[u8], encoding: Encoding) -> Option<String> {
    match encoding {
        Encoding::Utf8 | Encoding::Unknown => std::str::from_utf8(body).ok().map(str::to_string),
        Encoding::Utf16Le => decode_utf16(body, u16::from_le_bytes),
        Encoding::Utf16Be => decode_utf16(body, u16::from_be_bytes),
        Encoding::Utf32Le => decode_utf32(body, u32::from_le_bytes),
        Encoding::Utf32Be => decode_utf32(body, u32::from_be_bytes),
    }
}

fn decode_utf16(body: &[u8], from_bytes: fn([u8; 2]) -> u16) -> Option<String> {
    if body.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| from_bytes([c[0], c[1]]))
        .collect();
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .ok()
}

fn decode_utf32(body: &[u8], from_bytes: fn([u8; 4]) -> u32) -> Option<String> {
    if body.len() % 4 != 0 {
        return None;
    }
    let mut out = String::with_capacity(body.len() / 4);
    for c in body.chunks_exact(4) {
        let scalar = from_bytes([c[0], c[1], c[2], c[3]]);
        out.push(char::from_u32(scalar)?);
    }
    Some(out)
}

fn is_binary(decoded: &str) -> bool {
    if decoded.is_empty() {
        return false;
    }
    if decoded.contains('\0') {
        return true;
    }
    let total = decoded.chars().count();
    let control = decoded
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
        .count();
    let printable_ascii = decoded
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .count();

    (control as f64 / total as f64) > CONTROL_THRESHOLD
        || (printable_ascii as f64 / total as f64) < PRINTABLE_THRESHOLD
}

fn detect_line_ending(decoded: &str) -> LineEnding {
    let crlf = decoded.matches("\r\n").count();
    let bare_lf = decoded.matches('\n').count().saturating_sub(crlf);
    if crlf == 0 && bare_lf == 0 {
        LineEnding::Unknown
    } else if crlf >= bare_lf {
        LineEnding::Crlf
    } else {
        LineEnding::Lf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_text_unknown() {
        let ft = detect(b"", 0).unwrap();
        assert!(!ft.binary);
        assert_eq!(ft.encoding, Encoding::Unknown);
        assert_eq!(ft.line_ending, LineEnding::Unknown);
    }

    #[test]
    fn oversized_file_is_refused() {
        let err = detect(b"irrelevant", MAX_SIZE + 1).unwrap_err();
        assert!(matches!(err, FileTyperError::TooLarge(_)));
    }

    #[test]
    fn plain_ascii_is_utf8_text_lf() {
        let ft = detect(b"hello\nworld\n", 12).unwrap();
        assert!(!ft.binary);
        assert_eq!(ft.encoding, Encoding::Utf8);
        assert!(!ft.bom);
        assert_eq!(ft.line_ending, LineEnding::Lf);
    }

    #[test]
    fn crlf_wins_on_tie() {
        let ft = detect(b"a\r\nb\r\n", 6).unwrap();
        assert_eq!(ft.line_ending, LineEnding::Crlf);
    }

    #[test]
    fn nul_byte_makes_it_binary() {
        let ft = detect(b"abc\0def", 7).unwrap();
        assert!(ft.binary);
    }

    #[test]
    fn utf8_bom_is_detected_and_stripped() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"hello\n");
        let ft = detect(&data, data.len() as u64).unwrap();
        assert_eq!(ft.encoding, Encoding::Utf8);
        assert!(ft.bom);
        assert!(!ft.binary);
    }

    #[test]
    fn utf16le_bom_is_detected() {
        let mut data = vec![0xFF, 0xFE];
        for c in "hi".encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }
        let ft = detect(&data, data.len() as u64).unwrap();
        assert_eq!(ft.encoding, Encoding::Utf16Le);
        assert!(ft.bom);
    }

    #[test]
    fn utf32be_bom_is_detected() {
        let mut data = vec![0x00, 0x00, 0xFE, 0xFF];
        for c in "hi".chars() {
            data.extend_from_slice(&(c as u32).to_be_bytes());
        }
        let ft = detect(&data, data.len() as u64).unwrap();
        assert_eq!(ft.encoding, Encoding::Utf32Be);
        assert!(ft.bom);
    }

    #[test]
    fn invalid_utf8_without_bom_is_binary() {
        let ft = detect(&[0x01, 0xff, 0xfe, 0xfd, 0x02, 0xff], 6).unwrap();
        assert!(ft.binary);
    }
}
