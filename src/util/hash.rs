//! Hashing utilities.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
