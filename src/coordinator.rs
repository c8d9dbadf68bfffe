//! The top-level mining loop
//!
//! Each iteration seeds a fresh nonce, reads the current cut, and races
//! a mining attempt against the arrival of a newer cut from the
//! network. A preempting cut discards the attempt's partial work and
//! restarts it; a successful mine publishes the extended cut before the
//! next iteration begins, so the node's own next attempt already sees
//! the new block.

use crate::cache::TargetCache;
use crate::config::MinerConfig;
use crate::cut::Cut;
use crate::extend::{CutExtender, Extension};
use crate::store::{CutStore, Executor, HeaderDbSet, PayloadStore};
use crate::types::Nonce;
use crate::version::ChainwebVersion;
use crate::{Error, Result};
use rand::rngs::{OsRng, SmallRng};
use rand::{RngCore, SeedableRng};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before restarting a crashed mining loop
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Outcome of racing one mining attempt against the cut store
enum Attempt {
    /// A newer cut arrived; the attempt was discarded
    Preempted(Cut),
    /// The attempt produced and persisted a new block
    Mined(Box<Extension>),
    /// The attempt failed non-fatally; retry from a fresh cut read
    Aborted,
}

/// Drives mining attempts forever, one block at a time
pub struct MiningCoordinator {
    version: ChainwebVersion,
    cut_store: Arc<dyn CutStore>,
    extender: CutExtender,
}

impl MiningCoordinator {
    /// Wire up a coordinator over the node's collaborators
    pub fn new(
        version: ChainwebVersion,
        config: MinerConfig,
        cut_store: Arc<dyn CutStore>,
        executor: Arc<dyn Executor>,
        header_dbs: Arc<dyn HeaderDbSet>,
        payload_store: Arc<dyn PayloadStore>,
    ) -> Self {
        let extender = CutExtender::new(
            version,
            config.miner_info,
            executor,
            header_dbs,
            payload_store,
        );
        Self {
            version,
            cut_store,
            extender,
        }
    }

    /// Run the mining loop, restarting it from a fresh state whenever
    /// it crashes. Only a non-PoW misconfiguration aborts for good.
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            match self.run().await {
                Err(e @ Error::NonPowVersion { .. }) => {
                    error!(error = %e, "mining task aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, category = e.category(), "mining loop crashed, restarting");
                    tokio::time::sleep(RESTART_DELAY).await;
                }
                Ok(never) => match never {},
            }
        }
    }

    async fn run(&self) -> Result<Infallible> {
        // The cache and the chain-selection PRNG survive preemptions
        // and successes; both die with the loop.
        let mut cache = TargetCache::new();
        let mut rng = SmallRng::seed_from_u64(OsRng.next_u64());
        let mut mined = 0u64;

        'iteration: loop {
            let nonce0 = Nonce::new(OsRng.next_u64());
            let mut current = self.cut_store.current().await;

            loop {
                let cancel = CancellationToken::new();
                let outcome = tokio::select! {
                    // When this branch wins, the losing extend future is
                    // dropped in place, which discards the attempt's
                    // partial work; the token only matters for the code
                    // inside a still-running attempt.
                    newer = self.cut_store.await_newer(&current) => {
                        Attempt::Preempted(newer?)
                    }
                    result = self.extender.extend(
                        &current, nonce0, &mut cache, &mut rng, &cancel,
                    ) => match result {
                        Ok(extension) => Attempt::Mined(Box::new(extension)),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(Error::Cancelled { .. }) => Attempt::Aborted,
                        Err(e) => {
                            warn!(error = %e, "mining attempt aborted");
                            Attempt::Aborted
                        }
                    },
                };

                match outcome {
                    Attempt::Preempted(cut) => {
                        debug!(
                            cut_height = cut.cut_height(),
                            "newer cut observed, restarting attempt"
                        );
                        // The same nonce seed and cache carry over.
                        current = cut;
                    }
                    Attempt::Mined(extension) => {
                        let Extension { header, cut } = *extension;
                        self.cut_store.publish(cut.to_hashes(None)).await?;

                        let window = self
                            .version
                            .window()
                            .ok_or_else(|| Error::non_pow_version(self.version.name()))?;
                        cache.prune(header.height, window);

                        mined += 1;
                        info!("created new block {}", mined);
                        info!(
                            chain = %header.chain_id,
                            height = header.height.value(),
                            hash = %header.block_hash(),
                            "NewMinedBlock"
                        );
                        continue 'iteration;
                    }
                    Attempt::Aborted => continue 'iteration,
                }
            }
        }
    }
}
