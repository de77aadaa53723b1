/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

/// Best-effort MIME sniffing from the first bytes of decompressed content.
/// Only covers the handful of signatures relevant to a VCS object store;
/// anything else falls back to a binary/text guess.
pub fn sniff(sample: &[u8]) -> Option<String> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
    ];

    for (magic, mime) in SIGNATURES {
        if sample.starts_with(magic) {
            return Some((*mime).to_string());
        }
    }

    if sample.is_empty() {
        return None;
    }

    if std::str::from_utf8(sample).is_ok() {
        Some("text/plain".to_string())
    } else {
        Some("application/octet-stream".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\nrest"), Some("image/png".to_string()));
    }

    #[test]
    fn falls_back_to_text_plain() {
        assert_eq!(sniff(b"hello world"), Some("text/plain".to_string()));
    }

    #[test]
    fn falls_back_to_octet_stream_for_invalid_utf8() {
        assert_eq!(
            sniff(&[0xff, 0xfe, 0x00, 0x01]),
            Some("application/octet-stream".to_string())
        );
    }
}
