/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use pogo_types::{Encoding, LineEnding};

use crate::error::FileTyperError;

/// Incremental egress transform: the inverse of [`crate::canonical::Canonicalizer`].
/// Takes canonical UTF-8/LF bytes and restores the original encoding, BOM,
/// and line ending. Binary files pass through unchanged.
pub struct Typeifier {
    encoding: Encoding,
    bom: bool,
    line_ending: LineEnding,
    binary: bool,
    wrote_bom: bool,
    /// Bytes of a not-yet-complete UTF-8 sequence carried from the previous
    /// chunk.
    leftover: Vec<u8>,
}

impl Typeifier {
    pub fn new(encoding: Encoding, bom: bool, line_ending: LineEnding, binary: bool) -> Self {
        Typeifier {
            encoding,
            bom,
            line_ending,
            binary,
            wrote_bom: false,
            leftover: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, FileTyperError> {
        if self.binary {
            return Ok(chunk.to_vec());
        }

        let mut combined = std::mem::take(&mut self.leftover);
        combined.extend_from_slice(chunk);

        let (valid_len, tail) = split_valid_utf8_prefix(&combined);
        self.leftover = tail.to_vec();
        let text = std::str::from_utf8(&combined[..valid_len])
            .map_err(|_| FileTyperError::Malformed("utf-8", valid_len))?;

        let mut out = Vec::new();
        if !self.wrote_bom && self.bom {
            out.extend_from_slice(bom_bytes(self.encoding));
            self.wrote_bom = true;
        }
        out.extend(self.encode(text));
        Ok(out)
    }

    pub fn finish(self) -> Vec<u8> {
        Vec::new()
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        let with_line_ending = if matches!(self.line_ending, LineEnding::Crlf) {
            text.replace('\n', "\r\n")
        } else {
            text.to_string()
        };
        encode_from_utf8(&with_line_ending, self.encoding)
    }
}

/// Finds the longest prefix of `buf` that is valid UTF-8, returning its
/// length and the remaining (possibly-incomplete) suffix.
fn split_valid_utf8_prefix(buf: &[u8]) -> (usize, &[u8]) {
    match std::str::from_utf8(buf) {
        Ok(_) => (buf.len(), &buf[buf.len()..]),
        Err(e) => {
            let valid_len = e.valid_up_to();
            (valid_len, &buf[valid_len..])
        }
    }
}

fn bom_bytes(encoding: Encoding) -> &'static [u8] {
    match encoding {
        Encoding::Utf8 => &[0xEF, 0xBB, 0xBF],
        Encoding::Utf16Le => &[0xFF, 0xFE],
        Encoding::Utf16Be => &[0xFE, 0xFF],
        Encoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
        Encoding::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
        Encoding::Unknown => &[],
    }
}

fn encode_from_utf8(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 | Encoding::Unknown => text.as_bytes().to_vec(),
        Encoding::Utf16Le => text
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect(),
        Encoding::Utf16Be => text
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect(),
        Encoding::Utf32Le => text
            .chars()
            .flat_map(|c| (c as u32).to_le_bytes())
            .collect(),
        Encoding::Utf32Be => text
            .chars()
            .flat_map(|c| (c as u32).to_be_bytes())
            .collect(),
    }
}

/// Buffer-to-buffer convenience used by callers (and tests) that already
/// hold the whole canonical file in memory.
pub fn type_bytes(
    data: &[u8],
    encoding: Encoding,
    bom: bool,
    line_ending: LineEnding,
    binary: bool,
) -> Result<Vec<u8>, FileTyperError> {
    let mut t = Typeifier::new(encoding, bom, line_ending, binary);
    let mut out = t.push(data)?;
    out.extend(t.finish());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lf_restores_to_crlf() {
        let out = type_bytes(b"a\nb\n", Encoding::Utf8, false, LineEnding::Crlf, false).unwrap();
        assert_eq!(out, b"a\r\nb\r\n");
    }

    #[test]
    fn bom_is_restored() {
        let out = type_bytes(b"hi\n", Encoding::Utf8, true, LineEnding::Lf, false).unwrap();
        assert_eq!(out, [&[0xEFu8, 0xBB, 0xBF][..], b"hi\n"].concat());
    }

    #[test]
    fn utf16le_round_trips() {
        let canonical = b"hi\n";
        let out = type_bytes(canonical, Encoding::Utf16Le, false, LineEnding::Lf, false).unwrap();
        let expected: Vec<u8> = "hi\n".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn binary_passes_through_unchanged() {
        let data = vec![0x00, 0xFF, 0x01];
        let out = type_bytes(
            &data,
            Encoding::Unknown,
            false,
            LineEnding::Unknown,
            true,
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn bom_is_written_only_once_across_chunks() {
        let mut t = Typeifier::new(Encoding::Utf8, true, LineEnding::Lf, false);
        let mut out = t.push(b"a").unwrap();
        out.extend(t.push(b"b").unwrap());
        out.extend(t.finish());
        assert_eq!(out, [&[0xEFu8, 0xBB, 0xBF][..], b"ab"].concat());
    }
}
