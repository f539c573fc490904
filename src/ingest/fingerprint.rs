use sha2::{Sha256, Digest};

/// Compute the content fingerprint used for every dedup decision.
///
/// All whitespace is deleted before hashing, not just trimmed: chat
/// re-exports reformat whitespace freely without changing the content, and
/// the fingerprint must not treat those as new. Characters that differ in
/// anything but whitespace produce a different digest.
pub fn fingerprint(content: &str) -> String {
    let normalized: String = content.split_whitespace().collect();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a raw binary (retrieved image bytes). No normalization.
pub fn fingerprint_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
