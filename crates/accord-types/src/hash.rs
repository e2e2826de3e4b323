use sha2::{Digest, Sha256};

use crate::snapshot::SnapshotId;

/// Domain-separated SHA-256 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"accord-conflict-v1"`) prepended
/// to every computation, so values of different kinds never collide even when
/// their bytes are identical.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for conflict option pairs (resolution cache keys).
    pub const CONFLICT: Self = Self {
        domain: "accord-conflict-v1",
    };
    /// Hasher for combined multi-patch bodies (merged-patch cache keys).
    pub const COMBINED_PATCH: Self = Self {
        domain: "accord-combined-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        hasher.finalize().into()
    }

    /// Hash a pair of texts with an unambiguous separator between them.
    pub fn hash_pair(&self, a: &str, b: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(a.as_bytes());
        hasher.update([0x1F]);
        hasher.update(b.as_bytes());
        hasher.finalize().into()
    }

    /// Verify that data produces the expected snapshot id.
    pub fn verify(&self, data: &[u8], expected: &SnapshotId) -> bool {
        self.hash(data) == *expected.as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::CONFLICT.hash(data), ContentHasher::CONFLICT.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::CONFLICT.hash(data),
            ContentHasher::COMBINED_PATCH.hash(data)
        );
    }

    #[test]
    fn pair_separator_is_unambiguous() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let h1 = ContentHasher::CONFLICT.hash_pair("ab", "c");
        let h2 = ContentHasher::CONFLICT.hash_pair("a", "bc");
        assert_ne!(h1, h2);
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::CONFLICT.hash(b"data"));
    }
}
