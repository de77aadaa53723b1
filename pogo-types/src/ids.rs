/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PogoError;

/// Visually-unambiguous alphabet change ids are drawn from.
pub const CHANGE_ID_ALPHABET: [u8; 32] = [
    b'a', b'b', b'c', b'd', b'e', b'f', b'h', b'k', b'm', b'n', b'p', b'r', b'w', b'x', b'y',
    b'A', b'C', b'D', b'E', b'F', b'H', b'J', b'K', b'L', b'M', b'N', b'P', b'R', b'X', b'Y',
    b'3', b'4',
];

pub const CHANGE_ID_LEN: usize = 16;

/// A 16-character change identifier drawn from [`CHANGE_ID_ALPHABET`], unique
/// within the repository it was generated for.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeId([u8; CHANGE_ID_LEN]);

impl ChangeId {
    /// Draws a new random id. Collision with an existing id in the same
    /// repository is the caller's responsibility to detect and retry.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; CHANGE_ID_LEN];
        for b in bytes.iter_mut() {
            *b = CHANGE_ID_ALPHABET[rng.gen_range(0..CHANGE_ID_ALPHABET.len())];
        }
        ChangeId(bytes)
    }

    pub fn as_str(&self) -> &str {
        // Safe: every byte comes from CHANGE_ID_ALPHABET, which is ASCII.
        std::str::from_utf8(&self.0).expect("change id is always ascii")
    }

    /// True if `prefix` is a valid, in-alphabet prefix of this id.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.as_str())
    }
}

impl FromStr for ChangeId {
    type Err = PogoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CHANGE_ID_LEN {
            return Err(PogoError::invalid_input(format!(
                "change id must be {} characters, got {}",
                CHANGE_ID_LEN,
                s.len()
            )));
        }
        let mut bytes = [0u8; CHANGE_ID_LEN];
        for (i, c) in s.bytes().enumerate() {
            if !CHANGE_ID_ALPHABET.contains(&c) {
                return Err(PogoError::invalid_input(format!(
                    "change id contains a character outside the alphabet: {:?}",
                    c as char
                )));
            }
            bytes[i] = c;
        }
        Ok(ChangeId(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_display_and_fromstr() {
        let id = ChangeId::generate();
        let parsed: ChangeId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abc".parse::<ChangeId>().is_err());
    }

    #[test]
    fn rejects_out_of_alphabet_chars() {
        // 'i', 'l', 'o', 'q', etc. and digits other than 3/4 are excluded
        // for visual unambiguity.
        let candidate = "iiiiiiiiiiiiiiii";
        assert!(candidate.parse::<ChangeId>().is_err());
    }

    #[test]
    fn generated_ids_use_only_the_alphabet() {
        for _ in 0..100 {
            let id = ChangeId::generate();
            assert!(id.as_str().bytes().all(|b| CHANGE_ID_ALPHABET.contains(&b)));
        }
    }
}
