//! Checksum utilities
//!
//! SHA-256 over whole files, plus [`TokenDigest`], an incremental
//! digest over a sequence of string tokens. Every token is prefixed with its
//! byte length, so token contents can never shift a boundary: `["ab", "c"]`,
//! `["a", "bc"]` and `["a|", "b"]` vs `["a", "|b"]` all digest differently.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute SHA-256 checksum of a file
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Incremental SHA-256 over framed string tokens
///
/// The digest depends on token order. Callers that need order independence
/// sort their tokens first.
#[derive(Clone, Default)]
pub struct TokenDigest {
    hasher: Sha256,
    tokens: u64,
}

impl TokenDigest {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_framed(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Feed one token
    pub fn push_token(&mut self, token: &str) {
        self.update_framed(token.as_bytes());
        self.tokens += 1;
    }

    /// Feed a named field
    pub fn push_field(&mut self, name: &str, value: impl std::fmt::Display) {
        self.update_framed(name.as_bytes());
        self.update_framed(value.to_string().as_bytes());
        self.tokens += 1;
    }

    /// Number of tokens and fields fed so far
    pub fn len(&self) -> u64 {
        self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }

    /// Hex-encoded digest
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl std::fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenDigest")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Digest a set of tokens independently of their order
pub fn sorted_tokens_digest<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted: Vec<S> = tokens.into_iter().collect();
    sorted.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

    let mut digest = TokenDigest::new();
    for token in &sorted {
        digest.push_token(token.as_ref());
    }
    digest.finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_compute_file_checksum() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"test data").unwrap();
        temp_file.flush().unwrap();

        let checksum = compute_file_checksum(temp_file.path()).unwrap();
        // SHA-256 of "test data"
        assert_eq!(
            checksum,
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_token_framing_prevents_concatenation_collisions() {
        let mut a = TokenDigest::new();
        a.push_token("ab");
        a.push_token("c");

        let mut b = TokenDigest::new();
        b.push_token("a");
        b.push_token("bc");

        assert_ne!(a.finish(), b.finish());
    }

    fn digest_of(tokens: &[&str]) -> String {
        let mut digest = TokenDigest::new();
        for token in tokens {
            digest.push_token(token);
        }
        digest.finish()
    }

    #[test]
    fn test_separator_bearing_tokens_do_not_collide() {
        assert_ne!(digest_of(&["a|", "b"]), digest_of(&["a", "|b"]));
        assert_ne!(digest_of(&["a|b"]), digest_of(&["a", "b"]));
        assert_ne!(digest_of(&[""]), digest_of(&[]));
        assert_ne!(
            sorted_tokens_digest(["a|", "b"]),
            sorted_tokens_digest(["a", "|b"])
        );
    }

    #[test]
    fn test_field_values_cannot_spill_into_names() {
        let mut a = TokenDigest::new();
        a.push_field("rows", "1;min_ts=x");
        let mut b = TokenDigest::new();
        b.push_field("rows", 1);
        b.push_field("min_ts", "x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_token_digest_counts() {
        let mut digest = TokenDigest::new();
        assert!(digest.is_empty());
        digest.push_token("x");
        digest.push_field("rows", 3);
        assert_eq!(digest.len(), 2);
    }

    #[test]
    fn test_sorted_tokens_digest_of_empty_set_is_stable() {
        let empty: Vec<&str> = Vec::new();
        assert_eq!(sorted_tokens_digest(empty.clone()), sorted_tokens_digest(empty));
    }

    proptest! {
        #[test]
        fn prop_distinct_token_lists_digest_differently(
            a in proptest::collection::vec("[a|]{0,3}", 0..5),
            b in proptest::collection::vec("[a|]{0,3}", 0..5),
        ) {
            let digest = |tokens: &[String]| {
                let mut d = TokenDigest::new();
                for t in tokens {
                    d.push_token(t);
                }
                d.finish()
            };
            prop_assert_eq!(a == b, digest(&a) == digest(&b));
        }

        #[test]
        fn prop_sorted_digest_ignores_order(mut tokens in proptest::collection::vec("[a-z0-9]{0,8}", 0..40)) {
            let forward = sorted_tokens_digest(tokens.iter());
            tokens.reverse();
            let backward = sorted_tokens_digest(tokens.iter());
            prop_assert_eq!(forward, backward);
        }
    }
}
