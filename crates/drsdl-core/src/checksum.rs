//! Checksum algorithm dispatch and streaming verification during reassembly.
//!
//! The recognized set is extensible: a new digest is one match arm plus a
//! `Digest`-implementing hasher, not a hardcoded single-algorithm path.

use md5::Md5;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// An unrecognized `checksum.algorithm` string from a `resolve` response.
/// Fatal per-object per §4.3: no download is attempted.
#[derive(Debug, Clone, Error)]
#[error("unrecognized checksum algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

/// A streaming hasher selected by algorithm name, fed incrementally during reassembly.
pub enum StreamingDigest {
    Sha256(Sha256),
    Md5(Md5),
}

impl StreamingDigest {
    /// Builds a hasher for a recognized algorithm name (case-insensitive).
    /// Recognized: `sha256`, `md5`.
    pub fn for_algorithm(algorithm: &str) -> Result<Self, UnknownAlgorithm> {
        match algorithm.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(StreamingDigest::Sha256(Sha256::new())),
            "md5" => Ok(StreamingDigest::Md5(Md5::new())),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            StreamingDigest::Sha256(h) => h.update(chunk),
            StreamingDigest::Md5(h) => h.update(chunk),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            StreamingDigest::Sha256(h) => hex::encode(h.finalize()),
            StreamingDigest::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// True if `algorithm` is in the recognized set, without allocating a hasher.
pub fn is_recognized(algorithm: &str) -> bool {
    matches!(algorithm.to_ascii_lowercase().as_str(), "sha256" | "sha-256" | "md5")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let mut d = StreamingDigest::for_algorithm("sha256").unwrap();
        d.update(b"hello\n");
        assert_eq!(
            d.finalize_hex(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn sha256_chunked_matches_whole() {
        let mut whole = StreamingDigest::for_algorithm("sha256").unwrap();
        whole.update(b"hello world, this is a test");
        let whole_hex = whole.finalize_hex();

        let mut chunked = StreamingDigest::for_algorithm("SHA256").unwrap();
        chunked.update(b"hello worl");
        chunked.update(b"d, this is");
        chunked.update(b" a test");
        assert_eq!(chunked.finalize_hex(), whole_hex);
    }

    #[test]
    fn md5_known_vector() {
        let mut d = StreamingDigest::for_algorithm("md5").unwrap();
        d.update(b"hello\n");
        assert_eq!(d.finalize_hex(), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn unrecognized_algorithm_is_fatal() {
        let err = StreamingDigest::for_algorithm("crc32").unwrap_err();
        assert!(err.to_string().contains("crc32"));
        assert!(!is_recognized("crc32"));
    }

    #[test]
    fn recognized_is_case_insensitive() {
        assert!(is_recognized("Sha256"));
        assert!(is_recognized("MD5"));
    }
}
