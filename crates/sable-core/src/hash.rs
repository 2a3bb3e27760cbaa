//! Truncated digests: SHA-256 fingerprints and MD5 pattern hashes.

use md5::Md5;
use sha2::{Digest, Sha256};

/// SHA-256 of `input`, truncated to 12 lowercase hex characters.
/// Identifies a root-cause family of errors.
#[must_use]
pub fn sha256_12(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// MD5 of `input`, truncated to 10 lowercase hex characters.
/// Clusters semantically equivalent corrections or plans; callers must
/// canonicalize (lowercase/trim, deterministic serialization) before hashing.
#[must_use]
pub fn md5_10(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    hex::encode(digest)[..10].to_string()
}
