/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use pogo_types::{Encoding, LineEnding};

use crate::detect::decode_to_utf8;
use crate::error::FileTyperError;

/// Incremental ingest transform: decodes chunks under `encoding`/`bom` to
/// UTF-8 and collapses CRLF to LF, carrying partial multi-byte code units
/// and a pending trailing CR across chunk boundaries. Binary files and
/// files of unknown encoding pass through unchanged.
pub struct Canonicalizer {
    encoding: Encoding,
    binary: bool,
    bom_remaining: usize,
    /// Bytes of a not-yet-complete code unit: a partial UTF-8 rune for
    /// `Utf8`/`Unknown`, or a partial 2-/4-byte unit for UTF-16/32. Always
    /// empty for binary.
    leftover: Vec<u8>,
    /// True if the previous chunk ended in a lone `\r` whose fate (CRLF vs
    /// bare CR) depends on the next byte.
    pending_cr: bool,
}

impl Canonicalizer {
    pub fn new(encoding: Encoding, bom: bool, binary: bool) -> Self {
        let bom_len = if bom { bom_byte_len(encoding) } else { 0 };
        Canonicalizer {
            encoding,
            binary,
            bom_remaining: bom_len,
            leftover: Vec::new(),
            pending_cr: false,
        }
    }

    /// Feeds one chunk of raw input, returning the canonical UTF-8 bytes
    /// produced so far (may be empty if the chunk ended mid-code-unit).
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FileTyperError> {
        if self.binary {
            return Ok(chunk.to_vec());
        }

        let mut chunk = chunk;
        if self.bom_remaining > 0 {
            let skip = self.bom_remaining.min(chunk.len());
            chunk = &chunk[skip..];
            self.bom_remaining -= skip;
        }
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        let mut combined = std::mem::take(&mut self.leftover);
        combined.extend_from_slice(chunk);

        let usable_len = if matches!(self.encoding, Encoding::Utf8 | Encoding::Unknown) {
            split_valid_utf8_prefix(&combined)
        } else {
            let unit_size = code_unit_size(self.encoding);
            combined.len() - (combined.len() % unit_size)
        };
        self.leftover = combined[usable_len..].to_vec();
        let usable = &combined[..usable_len];

        let decoded = decode_to_utf8(usable, self.encoding)
            .ok_or(FileTyperError::Malformed("code unit", usable_len))?;

        Ok(self.collapse_crlf(&decoded))
    }

    /// Flushes any trailing pending CR. Call once after the final `push`.
    pub fn finish(mut self) -> Vec<u8> {
        if self.pending_cr {
            self.pending_cr = false;
            b"\r".to_vec()
        } else {
            Vec::new()
        }
    }

    fn collapse_crlf(&mut self, decoded: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(decoded.len());
        let mut chars = decoded.chars().peekable();
        if self.pending_cr {
            self.pending_cr = false;
            match chars.peek() {
                Some('\n') => {
                    out.push(b'\n');
                    chars.next();
                }
                _ => out.push(b'\r'),
            }
        }
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        out.push(b'\n');
                        chars.next();
                    } else if chars.peek().is_none() {
                        self.pending_cr = true;
                    } else {
                        out.push(b'\r');
                    }
                }
                other => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        out
    }
}

fn bom_byte_len(encoding: Encoding) -> usize {
    match encoding {
        Encoding::Utf8 => 3,
        Encoding::Utf16Le | Encoding::Utf16Be => 2,
        Encoding::Utf32Le | Encoding::Utf32Be => 4,
        Encoding::Unknown => 0,
    }
}

fn code_unit_size(encoding: Encoding) -> usize {
    match encoding {
        Encoding::Utf8 | Encoding::Unknown => 1,
        Encoding::Utf16Le | Encoding::Utf16Be => 2,
        Encoding::Utf32Le | Encoding::Utf32Be => 4,
    }
}

/// Longest prefix of `buf` that is valid UTF-8, so a rune split across a
/// chunk boundary is carried whole into the next `push` rather than handed
/// to the decoder one byte short.
fn split_valid_utf8_prefix(buf: &[u8]) -> usize {
    match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(e) => e.valid_up_to(),
    }
}

/// Buffer-to-buffer convenience used by callers (and tests) that already
/// hold the whole file in memory.
pub fn canonicalize_bytes(
    data: &[u8],
    encoding: Encoding,
    bom: bool,
    binary: bool,
) -> Result<Vec<u8>, FileTyperError> {
    let mut c = Canonicalizer::new(encoding, bom, binary);
    let mut out = c.push(data)?;
    out.extend(c.finish());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_crlf_collapses_to_lf() {
        let out = canonicalize_bytes(b"a\r\nb\r\nc", Encoding::Utf8, false, false).unwrap();
        assert_eq!(out, b"a\nb\nc");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"hi\n");
        let out = canonicalize_bytes(&data, Encoding::Utf8, true, false).unwrap();
        assert_eq!(out, b"hi\n");
    }

    #[test]
    fn binary_passes_through_unchanged() {
        let data = vec![0x00, 0xFF, 0x01, 0x02];
        let out = canonicalize_bytes(&data, Encoding::Unknown, false, true).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn utf16le_is_converted_to_utf8() {
        let mut data = Vec::new();
        for c in "hi\r\n".encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }
        let out = canonicalize_bytes(&data, Encoding::Utf16Le, false, false).unwrap();
        assert_eq!(out, b"hi\n");
    }

    #[test]
    fn cr_split_across_chunk_boundary_is_handled() {
        let mut c = Canonicalizer::new(Encoding::Utf8, false, false);
        let mut out = c.push(b"a\r").unwrap();
        out.extend(c.push(b"\nb").unwrap());
        out.extend(c.finish());
        assert_eq!(out, b"a\nb");
    }

    #[test]
    fn lone_trailing_cr_is_preserved() {
        let mut c = Canonicalizer::new(Encoding::Utf8, false, false);
        let mut out = c.push(b"a\r").unwrap();
        out.extend(c.finish());
        assert_eq!(out, b"a\r");
    }

    #[test]
    fn multibyte_utf8_split_across_chunk_boundary_is_handled() {
        // 'é' as 2-byte UTF-8 (0xC3 0xA9), split so the first chunk ends
        // mid-sequence.
        let bytes = "é".as_bytes();
        let mut c = Canonicalizer::new(Encoding::Utf8, false, false);
        let mut out = c.push(&bytes[..1]).unwrap();
        out.extend(c.push(&bytes[1..]).unwrap());
        out.extend(c.finish());
        assert_eq!(out, "é".as_bytes());
    }

    #[test]
    fn utf16le_code_unit_split_across_chunk_boundary_is_handled() {
        let utf16: Vec<u8> = "é".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let mut c = Canonicalizer::new(Encoding::Utf16Le, false, false);
        let mut out = c.push(&utf16[..1]).unwrap();
        out.extend(c.push(&utf16[1..]).unwrap());
        out.extend(c.finish());
        assert_eq!(out, "é".as_bytes());
    }

    #[test]
    fn four_byte_utf8_rune_split_across_an_8kib_chunk_boundary_is_handled() {
        // A 4-byte UTF-8 rune (an emoji) straddling a chunk boundary, the
        // exact shape a real 8 KiB streaming push hits.
        let rune = "🎉".as_bytes();
        assert_eq!(rune.len(), 4);
        let mut text = vec![b'a'; 8 * 1024 - 2];
        text.extend_from_slice(rune);
        text.push(b'\n');

        let mut c = Canonicalizer::new(Encoding::Utf8, false, false);
        let mut out = Vec::new();
        for chunk in text.chunks(8 * 1024) {
            out.extend(c.push(chunk).unwrap());
        }
        out.extend(c.finish());
        assert_eq!(out, text);
    }

    #[quickcheck_macros::quickcheck]
    fn roundtrip_through_any_encoding_and_line_ending(text: String, enc_pick: u8, crlf: bool, bom: bool) -> bool {
        // Canonical form is always LF, never carries a lone trailing '\r',
        // and never contains the BOM codepoint itself -- those are exactly
        // what `type_bytes`/`canonicalize_bytes` add and strip.
        let text = text.replace(['\r', '\u{feff}'], "");
        let line_ending = if crlf { LineEnding::Crlf } else { LineEnding::Lf };
        let encoding = match enc_pick % 5 {
            0 => Encoding::Utf8,
            1 => Encoding::Utf16Le,
            2 => Encoding::Utf16Be,
            3 => Encoding::Utf32Le,
            _ => Encoding::Utf32Be,
        };

        let original = crate::typeify::type_bytes(text.as_bytes(), encoding, bom, line_ending, false).unwrap();
        let roundtripped = canonicalize_bytes(&original, encoding, bom, false).unwrap();
        roundtripped == text.as_bytes()
    }
}
