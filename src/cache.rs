//! Per-epoch difficulty-target memoization
//!
//! Difficulty only changes at epoch boundaries, so the target computed
//! for one parent is consulted over and over while the miner retries on
//! the same cut. The cache is keyed by parent hash and pruned after
//! each successful mine, bounding it to roughly one window of entries
//! per chain.

use crate::header::BlockHeader;
use crate::store::HeaderDbSet;
use crate::types::{BlockHash, BlockHeight, ChainId, Target};
use crate::Result;
use std::collections::HashMap;

/// Target cache threaded through the mining loop
#[derive(Default)]
pub struct TargetCache {
    entries: HashMap<BlockHash, (BlockHeight, Target)>,
}

impl TargetCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached targets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached target for a parent hash, if present
    pub fn get(&self, parent_hash: &BlockHash) -> Option<Target> {
        self.entries.get(parent_hash).map(|(_, t)| *t)
    }

    /// Iterate over the cached heights, for bound checks
    pub fn heights(&self) -> impl Iterator<Item = BlockHeight> + '_ {
        self.entries.values().map(|(h, _)| *h)
    }

    /// The target a child of `parent` on chain `cid` must meet.
    ///
    /// Cached targets are returned as-is. On a miss the difficulty
    /// oracle of the chain's header database is consulted and the
    /// result cached; chains without a local database (degenerate test
    /// configurations) keep the parent's target uncached.
    ///
    /// The cache is only mutated after the oracle resolves, so an
    /// attempt cancelled mid-lookup leaves it untouched.
    pub async fn target_for(
        &mut self,
        dbs: &dyn HeaderDbSet,
        cid: ChainId,
        parent: &BlockHeader,
    ) -> Result<Target> {
        let parent_hash = parent.block_hash();
        if let Some((_, target)) = self.entries.get(&parent_hash) {
            return Ok(*target);
        }
        let Some(db) = dbs.for_chain(cid) else {
            return Ok(parent.target);
        };
        let target = db.hash_target(parent).await?;
        self.entries.insert(parent_hash, (parent.height, target));
        Ok(target)
    }

    /// Drop entries that can no longer be consulted: after mining a
    /// block at `tip`, only parents above `tip - window` remain
    /// relevant.
    pub fn prune(&mut self, tip: BlockHeight, window: u64) {
        self.entries
            .retain(|_, (height, _)| height.value().saturating_add(window) > tip.value());
    }
}
