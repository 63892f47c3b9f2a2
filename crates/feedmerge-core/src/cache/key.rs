//! Cache key derivation for feed URLs.

use sha1::{Digest, Sha1};

/// Derive the on-disk cache key for a feed URL (hex-encoded SHA-1, 40 chars).
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
