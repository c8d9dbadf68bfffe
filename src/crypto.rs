//! Proof-of-work hashing for the mining core
//!
//! The PoW hash of the versions under consideration is SHA-512/256
//! (a 32-byte digest). The engine exposes both a one-shot function for
//! the portable miner and a resettable context for the fast miner,
//! which feeds it the same mutable buffer on every iteration.

use crate::types::{BlockHash, Target};
use sha2::{Digest, Sha512_256};

/// PoW hash algorithm, selected from the chainweb version.
///
/// The capability set is `{reset, update, finalize -> 32 bytes}`;
/// currently the only member is SHA-512/256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-512/256 (FIPS 180-4 truncated SHA-512)
    Sha512t256,
}

impl HashAlgorithm {
    /// Create a fresh mutable hashing context for this algorithm
    pub fn hasher(&self) -> PowHasher {
        match self {
            HashAlgorithm::Sha512t256 => PowHasher::new(),
        }
    }
}

/// One-shot PoW hash of a serialized header-without-hash
pub fn pow_hash(bytes: &[u8]) -> BlockHash {
    BlockHash::new(Sha512_256::digest(bytes).into())
}

/// Mutable SHA-512/256 context reused across iterations of the fast
/// mining loop
pub struct PowHasher {
    inner: Sha512_256,
}

impl PowHasher {
    /// Create a new hashing context
    pub fn new() -> Self {
        Self {
            inner: Sha512_256::new(),
        }
    }

    /// Feed data into the context
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Write the digest into `out` and reset the context for the next
    /// iteration
    pub fn finalize_reset_into(&mut self, out: &mut [u8; 32]) {
        out.copy_from_slice(&self.inner.finalize_reset());
    }

    /// Finalize the context, consuming it
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl Default for PowHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast target check for the mining hot loop
///
/// Compares a raw digest against precomputed little-endian target words
/// without constructing a `Target`.
pub fn fast_check_target(target_words: &[u64; 4], hash: &[u8; 32]) -> bool {
    for i in (0..4).rev() {
        let hash_word = u64::from_le_bytes(hash[i * 8..(i + 1) * 8].try_into().unwrap());
        if hash_word < target_words[i] {
            return true;
        } else if hash_word > target_words[i] {
            return false;
        }
    }
    true
}

/// Hash `bytes` and check the digest against `target`
pub fn hash_meets_target(bytes: &[u8], target: &Target) -> bool {
    target.meets(pow_hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow_hash_deterministic() {
        let h1 = pow_hash(b"header bytes");
        let h2 = pow_hash(b"header bytes");
        assert_eq!(h1, h2);
        assert_ne!(h1, pow_hash(b"other bytes"));
    }

    #[test]
    fn test_sha512_256_known_answer() {
        // SHA-512/256("abc"), FIPS 180-4 example vector
        let digest = pow_hash(b"abc");
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "53048e2681941ef99b2e29b76b4c7dabe4c2d0c634fc6d46e0e2f13107e7af23"
        );
    }

    #[test]
    fn test_context_matches_one_shot() {
        let mut hasher = PowHasher::new();
        hasher.update(b"head");
        hasher.update(b"er bytes");
        let mut out = [0u8; 32];
        hasher.finalize_reset_into(&mut out);
        assert_eq!(&out, pow_hash(b"header bytes").as_bytes());

        // Context is usable again after the reset
        hasher.update(b"header bytes");
        assert_eq!(&hasher.finalize(), pow_hash(b"header bytes").as_bytes());
    }

    #[test]
    fn test_fast_check_agrees_with_target() {
        let target = Target::new([0xdead_beef, 42, 0, 0x0000_ffff_ffff_ffff]);
        let words = target.words();
        for seed in 0u8..32 {
            let digest = pow_hash(&[seed]);
            assert_eq!(
                fast_check_target(&words, digest.as_bytes()),
                target.meets(digest.as_bytes()),
            );
        }
    }

    #[test]
    fn test_fast_check_boundaries() {
        let words = [u64::MAX, u64::MAX, u64::MAX, u64::MAX >> 1];
        assert!(fast_check_target(&words, &[0u8; 32]));
        assert!(!fast_check_target(&words, &[0xffu8; 32]));
        // Equal hash meets the target
        let target = Target::new(words);
        assert!(fast_check_target(&words, &target.to_bytes()));
    }
}
