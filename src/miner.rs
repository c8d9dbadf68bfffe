//! Inner proof-of-work mining loops
//!
//! Both variants walk the nonce space of a candidate header until its
//! PoW hash meets the target, refreshing the embedded creation time on
//! a fixed iteration interval. The refresh checkpoint doubles as the
//! cancellation and cooperative-yield point, so preemption latency is
//! bounded by one batch.
//!
//! The portable variant goes through the generic codec and a fresh hash
//! per iteration. The fast variant keeps one mutable header buffer, one
//! scratch digest, and one hash context for the whole attempt; it
//! bypasses the generic encoding path and is gated on versions known to
//! be compatible with that layout.

use crate::crypto::{fast_check_target, pow_hash, PowHasher};
use crate::header::{inject_nonce, inject_time, BlockHeader};
use crate::types::{Nonce, Time};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Iterations between time refreshes, cancellation checks, and yields
pub const TIME_REFRESH_INTERVAL: u64 = 100_000;

/// Clock used to stamp candidate headers; injectable so tests can pin
/// the creation time
pub type Clock = fn() -> Time;

/// Mine a candidate header, choosing the fast loop when the version
/// supports it and falling back to the portable one otherwise
pub async fn mine_header(
    candidate: &BlockHeader,
    nonce0: Nonce,
    cancel: &CancellationToken,
    clock: Clock,
) -> Result<BlockHeader> {
    if candidate.version.has_fast_pow() {
        mine_fast(candidate, nonce0, cancel, clock).await
    } else {
        mine(candidate, nonce0, cancel, clock).await
    }
}

/// Portable mining loop
pub async fn mine(
    candidate: &BlockHeader,
    nonce0: Nonce,
    cancel: &CancellationToken,
    clock: Clock,
) -> Result<BlockHeader> {
    let mut buf = candidate.encode_without_hash();
    let mut nonce = nonce0;
    let mut batches = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("mining"));
        }
        inject_time(&mut buf, clock());

        for _ in 0..TIME_REFRESH_INTERVAL {
            inject_nonce(&mut buf, nonce);
            let hash = pow_hash(&buf);
            if candidate.target.meets(hash.as_bytes()) {
                return BlockHeader::decode_without_hash(&buf);
            }
            nonce.increment();
        }

        batches += 1;
        trace!(
            chain = %candidate.chain_id,
            hashes = batches * TIME_REFRESH_INTERVAL,
            "mining checkpoint"
        );
        tokio::task::yield_now().await;
    }
}

/// Optimized mining loop: single mutable buffer, reused hash context,
/// scratch digest
pub async fn mine_fast(
    candidate: &BlockHeader,
    nonce0: Nonce,
    cancel: &CancellationToken,
    clock: Clock,
) -> Result<BlockHeader> {
    let mut buf = candidate.encode_without_hash();
    let target_words = candidate.target.words();
    let mut hasher: PowHasher = candidate.version.pow_hash_algo().hasher();
    let mut digest = [0u8; 32];
    let mut nonce = nonce0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("mining"));
        }
        inject_time(&mut buf, clock());

        for _ in 0..TIME_REFRESH_INTERVAL {
            inject_nonce(&mut buf, nonce);
            hasher.update(&buf);
            hasher.finalize_reset_into(&mut digest);
            if fast_check_target(&target_words, &digest) {
                return BlockHeader::decode_without_hash(&buf);
            }
            nonce.increment();
        }

        tokio::task::yield_now().await;
    }
}
