//! Cuts: consistent slices across all chains of a chainweb
//!
//! A cut maps every chain of the version to one block header. The
//! braiding invariant ties the chains together: each header's
//! adjacent-parent record must be consistent with the neighboring
//! headers of the cut. Mining extends a cut one header at a time
//! through [`Cut::extend`].

use crate::header::BlockHeader;
use crate::types::{BlockHash, BlockHeight, ChainId};
use crate::version::ChainwebVersion;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cut: one block header per chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cut {
    version: ChainwebVersion,
    headers: BTreeMap<ChainId, BlockHeader>,
}

impl Cut {
    /// The genesis cut of a version
    pub fn genesis(version: ChainwebVersion) -> Self {
        let headers = version
            .chain_ids()
            .into_iter()
            .map(|cid| (cid, version.genesis_header(cid)))
            .collect();
        Self { version, headers }
    }

    /// Assemble a cut from per-chain headers, checking that every chain
    /// of the version is covered exactly
    pub fn from_headers(
        version: ChainwebVersion,
        headers: BTreeMap<ChainId, BlockHeader>,
    ) -> Result<Self> {
        for cid in version.chain_ids() {
            if !headers.contains_key(&cid) {
                return Err(Error::cut_violation(format!(
                    "cut is missing a header for chain {}",
                    cid
                )));
            }
        }
        if headers.len() as u32 != version.chain_count() {
            return Err(Error::cut_violation(format!(
                "cut covers {} chains, version {} has {}",
                headers.len(),
                version,
                version.chain_count()
            )));
        }
        Ok(Self { version, headers })
    }

    /// The version of this cut
    pub fn version(&self) -> ChainwebVersion {
        self.version
    }

    /// The header of chain `cid`
    pub fn header(&self, cid: ChainId) -> Option<&BlockHeader> {
        self.headers.get(&cid)
    }

    /// Iterate over all chain/header pairs
    pub fn headers(&self) -> impl Iterator<Item = (&ChainId, &BlockHeader)> {
        self.headers.iter()
    }

    /// The cut height: the sum of the block heights of all chains.
    /// Strictly monotone under extension, so it orders cuts by
    /// progress.
    pub fn cut_height(&self) -> u64 {
        self.headers.values().map(|h| h.height.value()).sum()
    }

    /// The largest block height of any chain in this cut
    pub fn max_block_height(&self) -> BlockHeight {
        self.headers
            .values()
            .map(|h| h.height)
            .max()
            .unwrap_or_default()
    }

    /// Whether splicing `header` into this cut is a monotonic extension:
    /// the header extends the current tip of its chain and its adjacent
    /// parents braid with the neighboring chains.
    pub fn is_monotonic_extension(&self, header: &BlockHeader) -> bool {
        let Some(tip) = self.header(header.chain_id) else {
            return false;
        };
        if header.parent != tip.block_hash() || header.height != tip.height.succ() {
            return false;
        }
        header.adjacents.iter().all(|(xcid, ah)| {
            match self.header(*xcid) {
                // Neighbor still at the parent's height: the new header
                // references it directly.
                Some(b) if b.height.succ() == header.height => *ah == b.block_hash(),
                // Neighbor already advanced: the new header references
                // its parent.
                Some(b) if b.height == header.height => *ah == b.parent,
                _ => false,
            }
        })
    }

    /// Splice a freshly mined header into this cut, producing the
    /// extended cut. Fails with a cut violation if the extension is not
    /// monotonic.
    pub fn extend(&self, header: &BlockHeader) -> Result<Cut> {
        if !self.version.contains_chain(header.chain_id) {
            return Err(Error::cut_violation(format!(
                "chain {} is not part of version {}",
                header.chain_id, self.version
            )));
        }
        if !self.is_monotonic_extension(header) {
            return Err(Error::cut_violation(format!(
                "header {} at {}@{} is not a monotonic extension",
                header.block_hash(),
                header.chain_id,
                header.height
            )));
        }
        let mut headers = self.headers.clone();
        headers.insert(header.chain_id, header.clone());
        Ok(Cut {
            version: self.version,
            headers,
        })
    }

    /// Check the braiding invariant across the whole cut.
    ///
    /// For each chain, every adjacent entry must reference the
    /// neighboring chain's block at one height below this chain's
    /// header. Within a cut, adjacent chains may differ in height by at
    /// most one; a neighbor one height ahead is referenced through a
    /// block outside the cut, so only the height relation is checked.
    pub fn check_braiding(&self) -> Result<()> {
        for (cid, header) in &self.headers {
            for (xcid, ah) in &header.adjacents {
                let b = self.header(*xcid).ok_or_else(|| {
                    Error::cut_violation(format!(
                        "chain {} references missing chain {}",
                        cid, xcid
                    ))
                })?;
                let ok = if b.height.succ() == header.height {
                    *ah == b.block_hash()
                } else if b.height == header.height {
                    *ah == b.parent
                } else {
                    b.height == header.height.succ()
                };
                if !ok {
                    return Err(Error::cut_violation(format!(
                        "chain {}@{} does not braid with chain {}@{}",
                        cid, header.height, xcid, b.height
                    )));
                }
            }
        }
        Ok(())
    }

    /// Project this cut to the gossip form published to the cut store
    pub fn to_hashes(&self, origin: Option<String>) -> CutHashes {
        CutHashes {
            origin,
            height: self.cut_height(),
            hashes: self
                .headers
                .iter()
                .map(|(cid, h)| {
                    (
                        *cid,
                        CutHashEntry {
                            height: h.height,
                            hash: h.block_hash(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Height and hash of one chain's tip within a [`CutHashes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutHashEntry {
    /// Block height of the tip
    pub height: BlockHeight,
    /// Block hash of the tip
    pub hash: BlockHash,
}

/// The gossip projection of a cut: per-chain tip hashes plus the
/// originating peer, if any. Locally mined cuts carry no origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutHashes {
    /// Peer the cut was received from; `None` for locally mined cuts
    pub origin: Option<String>,
    /// Cut height (sum of block heights)
    pub height: u64,
    /// Tip hash and height per chain
    pub hashes: BTreeMap<ChainId, CutHashEntry>,
}
