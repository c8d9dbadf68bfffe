//! Cut extension: one full mining attempt
//!
//! The extender picks a random chain whose adjacent-parent dependencies
//! are satisfied by the current cut, asks the execution service for a
//! payload, looks up the difficulty target, assembles a candidate
//! header, runs the inner miner, and splices the mined header back into
//! the cut before validating and persisting it.
//!
//! All collaborators are explicit handles on the extender; nothing is
//! threaded through globals.

use crate::cache::TargetCache;
use crate::cut::Cut;
use crate::header::BlockHeader;
use crate::miner::{mine_header, Clock};
use crate::store::{Executor, HeaderDbSet, PayloadStore};
use crate::types::{BlockHashRecord, MinerInfo, Nonce, Time};
use crate::version::ChainwebVersion;
use crate::{Error, Result};
use rand::rngs::SmallRng;
use rand::Rng;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A successful mining attempt: the new header and the extended cut
#[derive(Debug, Clone)]
pub struct Extension {
    /// The freshly mined header
    pub header: BlockHeader,
    /// The cut with the header spliced in
    pub cut: Cut,
}

/// Extends cuts by mining new blocks
pub struct CutExtender {
    version: ChainwebVersion,
    miner_info: MinerInfo,
    executor: Arc<dyn Executor>,
    header_dbs: Arc<dyn HeaderDbSet>,
    payload_store: Arc<dyn PayloadStore>,
    clock: Clock,
}

impl CutExtender {
    /// Create an extender over the given collaborators
    pub fn new(
        version: ChainwebVersion,
        miner_info: MinerInfo,
        executor: Arc<dyn Executor>,
        header_dbs: Arc<dyn HeaderDbSet>,
        payload_store: Arc<dyn PayloadStore>,
    ) -> Self {
        Self {
            version,
            miner_info,
            executor,
            header_dbs,
            payload_store,
            clock: Time::now,
        }
    }

    /// Replace the clock stamped into mined headers (test hook)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run one mining attempt against `cut`.
    ///
    /// Blocked chains are not errors: the attempt rotates to a fresh
    /// random chain, yielding so a preempting cut can win the race.
    /// Cancellation unwinds without touching the payload store or the
    /// header databases; `cache` is only ever updated atomically.
    pub async fn extend(
        &self,
        cut: &Cut,
        nonce0: Nonce,
        cache: &mut TargetCache,
        rng: &mut SmallRng,
        cancel: &CancellationToken,
    ) -> Result<Extension> {
        if cut.version() != self.version {
            return Err(Error::cut_violation(format!(
                "cut has version {}, miner is configured for {}",
                cut.version(),
                self.version
            )));
        }

        let chains = self.version.chain_ids();
        let (parent, adjacents) = loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("cut extension"));
            }
            let cid = chains[rng.gen_range(0..chains.len())];
            let parent = cut.header(cid).ok_or_else(|| {
                Error::cut_violation(format!("cut has no header for chain {}", cid))
            })?;
            match resolve_adjacents(cut, parent) {
                Some(adjacents) => break (parent, adjacents),
                None => {
                    debug!(chain = %cid, "adjacent parents not yet mined, rotating chains");
                    tokio::task::yield_now().await;
                }
            }
        };

        let payload = self.executor.new_block(&self.miner_info, parent).await?;
        let target = cache
            .target_for(self.header_dbs.as_ref(), parent.chain_id, parent)
            .await?;

        let candidate = BlockHeader {
            nonce: Nonce::new(0),
            creation_time: Time::EPOCH,
            parent: parent.block_hash(),
            adjacents,
            target,
            payload_hash: payload.payload_hash,
            chain_id: parent.chain_id,
            height: parent.height.succ(),
            version: self.version,
        };

        let header = mine_header(&candidate, nonce0, cancel, self.clock).await?;

        // By construction the mined header extends the cut; anything
        // else is corrupt state and crashes the mining task.
        let extended = cut.extend(&header)?;

        info!("validate block payload");
        self.executor.validate_block(&header, &payload).await?;
        info!("add block payload to payload cas");
        self.payload_store.add_new_payload(payload).await?;
        info!("add block to payload db");
        self.header_dbs.insert(header.clone()).await?;

        Ok(Extension {
            header,
            cut: extended,
        })
    }
}

/// Resolve the adjacent-parent hashes for a block extending `parent`,
/// or `None` if some neighboring chain has not caught up yet.
fn resolve_adjacents(cut: &Cut, parent: &BlockHeader) -> Option<BlockHashRecord> {
    let mut record = BlockHashRecord::new();
    for xcid in parent.adjacents.keys() {
        let b = cut.header(*xcid)?;
        if b.height == parent.height {
            record.insert(*xcid, b.block_hash());
        } else if b.height == parent.height.succ() {
            record.insert(*xcid, b.parent);
        } else {
            return None;
        }
    }
    Some(record)
}
