//! Collaborator contracts of the mining core
//!
//! The miner talks to the rest of the node through these traits: the
//! cut store, the per-chain header databases with their difficulty
//! oracle, the payload content-addressed store, and the execution
//! service. The in-memory backends below are the node's standalone
//! wiring and carry the integration tests.

use crate::cut::{Cut, CutHashes};
use crate::header::BlockHeader;
use crate::types::{BlockHash, ChainId, MinerInfo, PayloadWithOutputs, Target};
use crate::version::ChainwebVersion;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// The node's view of the current multi-chain tip
#[async_trait]
pub trait CutStore: Send + Sync {
    /// Read the current cut
    async fn current(&self) -> Cut;

    /// Block until a cut strictly newer than `prev` exists, and return
    /// it. "Newer" is ordered by cut height.
    async fn await_newer(&self, prev: &Cut) -> Result<Cut>;

    /// Publish a cut, typically right after a successful mine
    async fn publish(&self, hashes: CutHashes) -> Result<()>;
}

/// The execution service building and validating block payloads
#[async_trait]
pub trait Executor: Send + Sync {
    /// Build a fresh payload for a block extending `parent`
    async fn new_block(
        &self,
        miner: &MinerInfo,
        parent: &BlockHeader,
    ) -> Result<PayloadWithOutputs>;

    /// Validate a mined header against its payload. Failure aborts the
    /// attempt.
    async fn validate_block(
        &self,
        header: &BlockHeader,
        payload: &PayloadWithOutputs,
    ) -> Result<()>;
}

/// A single chain's block-header database
#[async_trait]
pub trait HeaderDb: Send + Sync {
    /// Difficulty oracle: the target a child of `parent` must meet
    async fn hash_target(&self, parent: &BlockHeader) -> Result<Target>;
}

/// The set of per-chain header databases
#[async_trait]
pub trait HeaderDbSet: Send + Sync {
    /// The database of chain `cid`, if the chain has a local one
    fn for_chain(&self, cid: ChainId) -> Option<Arc<dyn HeaderDb>>;

    /// Insert a validated header into its chain's database
    async fn insert(&self, header: BlockHeader) -> Result<()>;
}

/// The payload content-addressed store
#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// Insert a new payload, keyed by its content address
    async fn add_new_payload(&self, payload: PayloadWithOutputs) -> Result<()>;
}

/// Pluggable difficulty oracle of the in-memory header database
pub type TargetOracle = Box<dyn Fn(&BlockHeader) -> Target + Send + Sync>;

/// In-memory header database of one chain
pub struct MemHeaderDb {
    chain_id: ChainId,
    headers: RwLock<HashMap<BlockHash, BlockHeader>>,
    oracle: RwLock<Option<TargetOracle>>,
    consultations: AtomicU64,
}

impl MemHeaderDb {
    fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            headers: RwLock::new(HashMap::new()),
            oracle: RwLock::new(None),
            consultations: AtomicU64::new(0),
        }
    }

    /// The chain this database belongs to
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Replace the difficulty oracle. Without one, the oracle keeps the
    /// parent's target (constant difficulty).
    pub fn set_oracle(&self, oracle: TargetOracle) {
        *self.oracle.write() = Some(oracle);
    }

    /// How many times the difficulty oracle has been consulted
    pub fn oracle_consultations(&self) -> u64 {
        self.consultations.load(Ordering::Relaxed)
    }

    /// Look up a header by hash
    pub fn get(&self, hash: &BlockHash) -> Option<BlockHeader> {
        self.headers.read().get(hash).cloned()
    }

    /// Whether a header with this hash is stored
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.headers.read().contains_key(hash)
    }

    /// Number of stored headers
    pub fn len(&self) -> usize {
        self.headers.read().len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.headers.read().is_empty()
    }

    fn insert(&self, header: BlockHeader) {
        self.headers.write().insert(header.block_hash(), header);
    }
}

#[async_trait]
impl HeaderDb for MemHeaderDb {
    async fn hash_target(&self, parent: &BlockHeader) -> Result<Target> {
        self.consultations.fetch_add(1, Ordering::Relaxed);
        let oracle = self.oracle.read();
        Ok(match oracle.as_ref() {
            Some(f) => f(parent),
            None => parent.target,
        })
    }
}

/// In-memory set of per-chain header databases, seeded with the
/// genesis header of every chain
pub struct MemHeaderDbSet {
    version: ChainwebVersion,
    dbs: BTreeMap<ChainId, Arc<MemHeaderDb>>,
}

impl MemHeaderDbSet {
    /// Create a database per chain of `version`, each holding its
    /// genesis header
    pub fn new(version: ChainwebVersion) -> Self {
        let dbs: BTreeMap<_, _> = version
            .chain_ids()
            .into_iter()
            .map(|cid| (cid, Arc::new(MemHeaderDb::new(cid))))
            .collect();
        for (cid, db) in &dbs {
            db.insert(version.genesis_header(*cid));
        }
        Self { version, dbs }
    }

    /// Create a set with no per-chain databases at all (degenerate test
    /// configuration; the target cache then falls back to the parent's
    /// target)
    pub fn new_unbacked(version: ChainwebVersion) -> Self {
        Self {
            version,
            dbs: BTreeMap::new(),
        }
    }

    /// The version this set was created for
    pub fn version(&self) -> ChainwebVersion {
        self.version
    }

    /// Concrete accessor for a chain's database
    pub fn chain_db(&self, cid: ChainId) -> Option<&Arc<MemHeaderDb>> {
        self.dbs.get(&cid)
    }

    /// Look up a header by chain and hash
    pub fn lookup(&self, cid: ChainId, hash: &BlockHash) -> Option<BlockHeader> {
        self.dbs.get(&cid).and_then(|db| db.get(hash))
    }

    /// Total number of headers across all chains
    pub fn total_headers(&self) -> usize {
        self.dbs.values().map(|db| db.len()).sum()
    }
}

#[async_trait]
impl HeaderDbSet for MemHeaderDbSet {
    fn for_chain(&self, cid: ChainId) -> Option<Arc<dyn HeaderDb>> {
        self.dbs.get(&cid).map(|db| db.clone() as Arc<dyn HeaderDb>)
    }

    async fn insert(&self, header: BlockHeader) -> Result<()> {
        let db = self.dbs.get(&header.chain_id).ok_or_else(|| {
            Error::store(format!("no header db for chain {}", header.chain_id))
        })?;
        db.insert(header);
        Ok(())
    }
}

/// In-memory payload content-addressed store
#[derive(Default)]
pub struct MemPayloadStore {
    payloads: RwLock<HashMap<BlockHash, PayloadWithOutputs>>,
}

impl MemPayloadStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a payload by content address
    pub fn get(&self, hash: &BlockHash) -> Option<PayloadWithOutputs> {
        self.payloads.read().get(hash).cloned()
    }

    /// Whether a payload with this address is stored
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.payloads.read().contains_key(hash)
    }

    /// Number of stored payloads
    pub fn len(&self) -> usize {
        self.payloads.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.payloads.read().is_empty()
    }
}

#[async_trait]
impl PayloadStore for MemPayloadStore {
    async fn add_new_payload(&self, payload: PayloadWithOutputs) -> Result<()> {
        self.payloads.write().insert(payload.payload_hash, payload);
        Ok(())
    }
}

/// In-memory cut store backed by a watch channel, giving `await_newer`
/// its wait-for-change semantics
pub struct MemCutStore {
    tx: watch::Sender<Cut>,
    dbs: Arc<MemHeaderDbSet>,
}

impl MemCutStore {
    /// Create a store holding `initial`, resolving published cut hashes
    /// against `dbs`
    pub fn new(initial: Cut, dbs: Arc<MemHeaderDbSet>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx, dbs }
    }
}

#[async_trait]
impl CutStore for MemCutStore {
    async fn current(&self) -> Cut {
        self.tx.borrow().clone()
    }

    async fn await_newer(&self, prev: &Cut) -> Result<Cut> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let cur = rx.borrow_and_update();
                if cur.cut_height() > prev.cut_height() {
                    return Ok(cur.clone());
                }
            }
            rx.changed()
                .await
                .map_err(|_| Error::store("cut store closed"))?;
        }
    }

    async fn publish(&self, hashes: CutHashes) -> Result<()> {
        let mut headers = BTreeMap::new();
        for (cid, entry) in &hashes.hashes {
            let header = self.dbs.lookup(*cid, &entry.hash).ok_or_else(|| {
                Error::store(format!(
                    "published cut references unknown header {} on chain {}",
                    entry.hash, cid
                ))
            })?;
            headers.insert(*cid, header);
        }
        let cut = Cut::from_headers(self.tx.borrow().version(), headers)?;
        cut.check_braiding()?;
        // Competing cuts at the same height do not replace the current
        // one; only strictly newer cuts wake subscribers.
        self.tx.send_if_modified(|cur| {
            if cut.cut_height() > cur.cut_height() {
                *cur = cut;
                true
            } else {
                false
            }
        });
        Ok(())
    }
}

/// Deterministic executor for standalone and test nodes: builds a
/// coinbase-only payload for each parent and validates by re-deriving
/// the payload's content address
#[derive(Default)]
pub struct DevExecutor {
    new_block_calls: AtomicU64,
}

impl DevExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self::default()
    }

    /// How many payloads have been requested
    pub fn new_block_calls(&self) -> u64 {
        self.new_block_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Executor for DevExecutor {
    async fn new_block(
        &self,
        miner: &MinerInfo,
        parent: &BlockHeader,
    ) -> Result<PayloadWithOutputs> {
        self.new_block_calls.fetch_add(1, Ordering::Relaxed);
        let mut coinbase = Vec::with_capacity(48);
        coinbase.extend_from_slice(b"coinbase:");
        coinbase.extend_from_slice(parent.block_hash().as_bytes());
        let mut payload = PayloadWithOutputs {
            payload_hash: BlockHash::new([0u8; 32]),
            miner_data: serde_json::to_vec(miner)?,
            transactions: vec![coinbase],
        };
        payload.payload_hash = payload.compute_hash();
        Ok(payload)
    }

    async fn validate_block(
        &self,
        header: &BlockHeader,
        payload: &PayloadWithOutputs,
    ) -> Result<()> {
        if payload.compute_hash() != payload.payload_hash {
            return Err(Error::payload(
                "payload hash does not match payload contents",
            ));
        }
        if header.payload_hash != payload.payload_hash {
            return Err(Error::payload(
                "header does not reference the validated payload",
            ));
        }
        Ok(())
    }
}
