//! Chainweb versions and their chain graphs
//!
//! A version fixes every consensus parameter the miner consumes: the
//! finite chain-id set, the adjacency graph braiding the chains, the
//! difficulty-adjustment epoch window, and the PoW hash algorithm.
//! All of them are pure functions of the version.

use crate::crypto::{pow_hash, HashAlgorithm};
use crate::header::BlockHeader;
use crate::types::{BlockHash, BlockHeight, ChainId, Nonce, Target, Time};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A chainweb version
///
/// The set is closed: headers carrying any other version code fail to
/// decode rather than falling back to a guessed algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainwebVersion {
    /// One chain, no adjacency edges, trivial maximum target
    TestSingleton,
    /// Two chains; chain 0 references chain 1, chain 1 runs free
    TestPair,
    /// Three chains on the complete graph K3
    TestTriangle,
    /// Ten chains on the Petersen graph
    TestPetersen,
    /// Timed consensus without proof-of-work. Mining on this version is
    /// a misconfiguration; the miner aborts at its first success when
    /// it finds no difficulty window.
    TimedConsensus,
}

/// Neighbor table of the Petersen graph: outer 5-cycle 0..4, inner
/// pentagram 5..9, spokes between them. 3-regular and symmetric.
const PETERSEN: [[u32; 3]; 10] = [
    [1, 4, 5],
    [2, 0, 6],
    [3, 1, 7],
    [4, 2, 8],
    [0, 3, 9],
    [7, 8, 0],
    [8, 9, 1],
    [9, 5, 2],
    [5, 6, 3],
    [6, 7, 4],
];

impl ChainwebVersion {
    /// Stable wire code identifying this version in encoded headers
    pub fn code(&self) -> u32 {
        match self {
            ChainwebVersion::TestSingleton => 0x8000_0001,
            ChainwebVersion::TestPair => 0x8000_0002,
            ChainwebVersion::TestTriangle => 0x8000_0003,
            ChainwebVersion::TestPetersen => 0x8000_0004,
            ChainwebVersion::TimedConsensus => 0x8000_0005,
        }
    }

    /// Resolve a wire code back to a version
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0x8000_0001 => Ok(ChainwebVersion::TestSingleton),
            0x8000_0002 => Ok(ChainwebVersion::TestPair),
            0x8000_0003 => Ok(ChainwebVersion::TestTriangle),
            0x8000_0004 => Ok(ChainwebVersion::TestPetersen),
            0x8000_0005 => Ok(ChainwebVersion::TimedConsensus),
            _ => Err(Error::UnknownVersion { code }),
        }
    }

    /// Human-readable version name
    pub fn name(&self) -> &'static str {
        match self {
            ChainwebVersion::TestSingleton => "test-singleton",
            ChainwebVersion::TestPair => "test-pair",
            ChainwebVersion::TestTriangle => "test-triangle",
            ChainwebVersion::TestPetersen => "test-petersen",
            ChainwebVersion::TimedConsensus => "timed-consensus",
        }
    }

    /// Number of chains
    pub fn chain_count(&self) -> u32 {
        match self {
            ChainwebVersion::TestSingleton => 1,
            ChainwebVersion::TestPair => 2,
            ChainwebVersion::TestTriangle => 3,
            ChainwebVersion::TestPetersen => 10,
            ChainwebVersion::TimedConsensus => 2,
        }
    }

    /// The finite chain-id set of this version
    pub fn chain_ids(&self) -> Vec<ChainId> {
        (0..self.chain_count()).map(ChainId::new).collect()
    }

    /// Whether `cid` is a chain of this version
    pub fn contains_chain(&self, cid: ChainId) -> bool {
        cid.value() < self.chain_count()
    }

    /// Graph neighbors of `cid`: the chains a block on `cid` must
    /// reference as adjacent parents
    pub fn adjacents(&self, cid: ChainId) -> Vec<ChainId> {
        match self {
            ChainwebVersion::TestSingleton => Vec::new(),
            ChainwebVersion::TestPair => match cid.value() {
                0 => vec![ChainId::new(1)],
                _ => Vec::new(),
            },
            ChainwebVersion::TestTriangle => (0..3)
                .filter(|&i| i != cid.value())
                .map(ChainId::new)
                .collect(),
            ChainwebVersion::TestPetersen => PETERSEN[cid.value() as usize]
                .iter()
                .map(|&i| ChainId::new(i))
                .collect(),
            ChainwebVersion::TimedConsensus => match cid.value() {
                0 => vec![ChainId::new(1)],
                _ => vec![ChainId::new(0)],
            },
        }
    }

    /// Difficulty-adjustment epoch window in blocks, or `None` for
    /// versions without proof-of-work
    pub fn window(&self) -> Option<u64> {
        match self {
            ChainwebVersion::TestSingleton => Some(10),
            ChainwebVersion::TestPair => Some(5),
            ChainwebVersion::TestTriangle => Some(5),
            ChainwebVersion::TestPetersen => Some(120),
            ChainwebVersion::TimedConsensus => None,
        }
    }

    /// The PoW hash algorithm of this version
    pub fn pow_hash_algo(&self) -> HashAlgorithm {
        HashAlgorithm::Sha512t256
    }

    /// Whether the optimized inner miner, which bypasses the generic
    /// encoding path, is known to be compatible with this version
    pub fn has_fast_pow(&self) -> bool {
        !matches!(self, ChainwebVersion::TimedConsensus)
    }

    /// Genesis block target of every chain
    pub fn genesis_target(&self) -> Target {
        Target::max()
    }

    /// Deterministic placeholder hash standing in for the (nonexistent)
    /// parent of a genesis block
    pub fn genesis_parent(&self, cid: ChainId) -> BlockHash {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(b"chainweb-genesis-parent");
        buf.extend_from_slice(&self.code().to_le_bytes());
        buf.extend_from_slice(&cid.value().to_le_bytes());
        pow_hash(&buf)
    }

    /// The genesis block header of chain `cid`
    ///
    /// Genesis adjacents reference the genesis-parent placeholders of
    /// the neighboring chains, so a genesis cut is braided by
    /// construction.
    pub fn genesis_header(&self, cid: ChainId) -> BlockHeader {
        let adjacents = self
            .adjacents(cid)
            .into_iter()
            .map(|x| (x, self.genesis_parent(x)))
            .collect();
        BlockHeader {
            nonce: Nonce::new(0),
            creation_time: Time::EPOCH,
            parent: self.genesis_parent(cid),
            adjacents,
            target: self.genesis_target(),
            payload_hash: pow_hash(b"chainweb-genesis-payload"),
            chain_id: cid,
            height: BlockHeight::new(0),
            version: *self,
        }
    }
}

impl fmt::Display for ChainwebVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ChainwebVersion; 5] = [
        ChainwebVersion::TestSingleton,
        ChainwebVersion::TestPair,
        ChainwebVersion::TestTriangle,
        ChainwebVersion::TestPetersen,
        ChainwebVersion::TimedConsensus,
    ];

    #[test]
    fn test_code_roundtrip() {
        for v in ALL {
            assert_eq!(ChainwebVersion::from_code(v.code()).unwrap(), v);
        }
        assert!(matches!(
            ChainwebVersion::from_code(0xdead_beef),
            Err(Error::UnknownVersion { code: 0xdead_beef })
        ));
    }

    #[test]
    fn test_graphs_are_well_formed() {
        for v in ALL {
            for cid in v.chain_ids() {
                for adj in v.adjacents(cid) {
                    assert_ne!(adj, cid, "{v}: self-loop on chain {cid}");
                    assert!(v.contains_chain(adj), "{v}: edge out of the chain set");
                }
            }
        }
    }

    #[test]
    fn test_petersen_is_three_regular_and_symmetric() {
        let v = ChainwebVersion::TestPetersen;
        for cid in v.chain_ids() {
            let neighbors = v.adjacents(cid);
            assert_eq!(neighbors.len(), 3);
            for n in neighbors {
                assert!(v.adjacents(n).contains(&cid));
            }
        }
    }

    #[test]
    fn test_windows() {
        assert_eq!(ChainwebVersion::TestSingleton.window(), Some(10));
        assert_eq!(ChainwebVersion::TestTriangle.window(), Some(5));
        assert_eq!(ChainwebVersion::TimedConsensus.window(), None);
    }

    #[test]
    fn test_genesis_parent_is_distinct_per_chain() {
        let v = ChainwebVersion::TestTriangle;
        let parents: Vec<_> = v.chain_ids().iter().map(|&c| v.genesis_parent(c)).collect();
        assert_ne!(parents[0], parents[1]);
        assert_ne!(parents[1], parents[2]);
        // and distinct across versions
        assert_ne!(
            v.genesis_parent(ChainId::new(0)),
            ChainwebVersion::TestPair.genesis_parent(ChainId::new(0))
        );
    }

    #[test]
    fn test_genesis_header_shape() {
        let v = ChainwebVersion::TestPetersen;
        let g = v.genesis_header(ChainId::new(3));
        assert_eq!(g.height, BlockHeight::new(0));
        assert_eq!(g.adjacents.len(), 3);
        assert_eq!(g.target, Target::max());
        for (x, h) in &g.adjacents {
            assert_eq!(*h, v.genesis_parent(*x));
        }
    }
}
