//! Stable content hashing for question text.

use sha2::{Digest, Sha256};

/// Returns the SHA-256 hex digest of a question string.
///
/// Used as the answer-cache key. Deterministic: the same text always yields
/// the same digest.
pub fn question_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
