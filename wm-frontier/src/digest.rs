//! Payload digests for revisit detection (SPEC_FULL §11 "revisit/dedup
//! via SHA-256 payload digest"): a fetched body's digest is compared
//! against the URL Table's `visits` history before deciding whether a
//! document is new content or a byte-identical revisit.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a response body, the value stored in
/// and looked up from [`crate::table::UrlTable::get_revisit_id`].
#[must_use]
pub fn payload_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_for_identical_input() {
        assert_eq!(payload_digest(b"hello"), payload_digest(b"hello"));
    }

    #[test]
    fn digest_differs_for_different_input() {
        assert_ne!(payload_digest(b"hello"), payload_digest(b"world"));
    }

    #[test]
    fn known_vector_matches_sha256_of_empty_input() {
        assert_eq!(
            payload_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
