//! SHA-256 helpers for package bytes and extracted files.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream a file through SHA-256. Returns the hex digest and byte count.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
pub fn digest_matches(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let (hash, size) = sha256_file(&path).unwrap();
        assert_eq!(hash, sha256_hex(b"hello world"));
        assert_eq!(size, 11);
    }

    #[test]
    fn digest_comparison_is_case_insensitive() {
        let h = sha256_hex(b"x");
        assert!(digest_matches(&h, &h.to_uppercase()));
        assert!(!digest_matches(&h, &sha256_hex(b"y")));
    }
}
